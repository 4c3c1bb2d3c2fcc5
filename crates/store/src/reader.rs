//! Point reads and lazily paged queries.
//!
//! [`QueryPager`] walks a query forward one page at a time and only asks
//! the store for the next page once the caller has consumed the previous
//! one. A page that fails leaves the pager faulted: it refuses to continue
//! until [`QueryPager::restart`] starts over from the first page.

use std::{collections::VecDeque, fmt, marker::PhantomData};

use futures::{Stream, stream};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    backend::DocumentStore,
    error::{StoreError, StoreResult},
    types::{PartitionKey, QueryParameter, QueryRequest, Response},
    workspace::ContainerHandle,
};

/// A query and how to run it.
///
/// The query text is handed to the store unchanged. Pinning the partition
/// (here, or with an equality on the partition-key field inside the filter)
/// keeps the query on a single partition; otherwise the store fans out.
///
/// # Example
///
/// ```
/// use docshard_store::QuerySpec;
///
/// let spec = QuerySpec::new("SELECT * FROM c WHERE c.lastName = @name")
///     .with_parameter("@name", "Andersen")
///     .within_partition("Andersen")
///     .with_max_item_count(10);
/// assert_eq!(spec.partition_key().map(|pk| pk.as_str()), Some("Andersen"));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    query: String,
    parameters: Vec<QueryParameter>,
    partition_key: Option<PartitionKey>,
    max_item_count: Option<u32>,
}

impl QuerySpec {
    /// Creates a query from SQL-like text.
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    /// Binds a named parameter (`@name`).
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(QueryParameter { name: name.into(), value: value.into() });
        self
    }

    /// Routes the query to a single partition.
    #[must_use]
    pub fn within_partition(mut self, partition_key: impl Into<PartitionKey>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    /// Caps the number of items per page.
    #[must_use]
    pub fn with_max_item_count(mut self, max_item_count: u32) -> Self {
        self.max_item_count = Some(max_item_count);
        self
    }

    /// Returns the query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the partition the query is routed to, if pinned.
    #[must_use]
    pub fn partition_key(&self) -> Option<&PartitionKey> {
        self.partition_key.as_ref()
    }

    fn request(&self, continuation: Option<String>) -> QueryRequest {
        QueryRequest {
            query: self.query.clone(),
            parameters: self.parameters.clone(),
            partition_key: self.partition_key.clone(),
            max_item_count: self.max_item_count,
            continuation,
        }
    }
}

/// One page of decoded query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items of this page, in store order.
    pub items: Vec<T>,
    /// Request units the page cost.
    pub request_charge: f64,
    /// `true` when another page follows.
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PagerState {
    Fresh,
    Continue(String),
    Exhausted,
    Faulted,
}

/// Forward-only, restartable iteration over a query's pages.
///
/// Created by [`ContainerHandle::query`].
pub struct QueryPager<S, T> {
    container: ContainerHandle<S>,
    spec: QuerySpec,
    state: PagerState,
    _item: PhantomData<fn() -> T>,
}

impl<S, T> fmt::Debug for QueryPager<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPager")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore, T: DeserializeOwned + Send> QueryPager<S, T> {
    /// Fetches the next page.
    ///
    /// Returns `None` once the last page was returned. After an error every
    /// call answers [`StoreError::QueryFaulted`] until
    /// [`restart`](Self::restart).
    pub async fn next_page(&mut self) -> Option<StoreResult<Page<T>>> {
        let continuation = match &self.state {
            PagerState::Fresh => None,
            PagerState::Continue(token) => Some(token.clone()),
            PagerState::Exhausted => return None,
            PagerState::Faulted => return Some(Err(StoreError::QueryFaulted)),
        };

        let request = self.spec.request(continuation);
        let store = self.container.workspace.store();
        let link = &self.container.link;
        let request = &request;
        let fetched =
            self.container.workspace.metered("query_items", move || store.query_items(link, request)).await;

        match fetched.and_then(decode_page) {
            Ok((page, continuation)) => {
                self.state = match continuation {
                    Some(token) => PagerState::Continue(token),
                    None => PagerState::Exhausted,
                };
                Some(Ok(page))
            },
            Err(err) => {
                tracing::warn!(error = %err, query = %self.spec.query, "query page failed");
                self.state = PagerState::Faulted;
                Some(Err(err))
            },
        }
    }

    /// Rewinds to the first page, clearing a fault.
    pub fn restart(&mut self) {
        self.state = PagerState::Fresh;
    }

    /// Returns `true` once the last page was fetched.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == PagerState::Exhausted
    }

    /// Returns `true` after a page failed and before a restart.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.state == PagerState::Faulted
    }

    /// Flattens the remaining pages into a stream of items.
    ///
    /// The next page is only requested when the buffered one is drained.
    /// The stream ends after yielding the first error.
    pub fn into_stream(self) -> impl Stream<Item = StoreResult<T>> {
        stream::unfold((self, VecDeque::new(), false), |(mut pager, mut buffer, done)| async move {
            loop {
                if let Some(item) = buffer.pop_front() {
                    return Some((Ok(item), (pager, buffer, done)));
                }
                if done {
                    return None;
                }
                match pager.next_page().await {
                    None => return None,
                    Some(Ok(page)) => buffer.extend(page.items),
                    Some(Err(err)) => return Some((Err(err), (pager, buffer, true))),
                }
            }
        })
    }

    /// Drains every remaining page into one vector.
    ///
    /// # Errors
    ///
    /// The first page error; items fetched before it are discarded.
    pub async fn try_collect_all(mut self) -> StoreResult<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await {
            items.extend(page?.items);
        }
        Ok(items)
    }
}

fn decode_page<T: DeserializeOwned>(
    response: Response<Vec<Value>>,
) -> StoreResult<(Page<T>, Option<String>)> {
    let items = response
        .resource
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()?;
    let page = Page {
        items,
        request_charge: response.request_charge,
        has_more: response.continuation.is_some(),
    };
    Ok((page, response.continuation))
}

impl<S: DocumentStore> ContainerHandle<S> {
    /// Point-reads an item by its full identity.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] unless an item with this `id` exists in this
    /// partition, [`StoreError::Serialization`] when it does not decode.
    #[tracing::instrument(skip(self, partition_key), fields(container = %self.link, %partition_key))]
    pub async fn read_item<T>(&self, id: &str, partition_key: &PartitionKey) -> StoreResult<Response<T>>
    where
        T: DeserializeOwned + Send,
    {
        let store = self.workspace.store();
        let link = &self.link;
        let response =
            self.workspace.metered("read_item", move || store.read_item(link, id, partition_key)).await?;
        response.try_map(|value| serde_json::from_value(value).map_err(StoreError::from))
    }

    /// Starts a lazily paged query. Nothing is sent until the first page is
    /// requested.
    #[must_use]
    pub fn query<T>(&self, spec: QuerySpec) -> QueryPager<S, T>
    where
        T: DeserializeOwned + Send,
    {
        tracing::debug!(
            query = %spec.query,
            routed = spec.partition_key.is_some(),
            "query prepared",
        );
        QueryPager { container: self.clone(), spec, state: PagerState::Fresh, _item: PhantomData }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::testutil::{TestDoc, provisioned_container};

    async fn seeded(count: usize) -> (crate::MemoryStore, ContainerHandle<crate::MemoryStore>) {
        let (store, items) = provisioned_container().await;
        for i in 0..count {
            items.create_if_absent(&TestDoc::new(&format!("a{i:02}"), "A", "v")).await.unwrap();
        }
        items.create_if_absent(&TestDoc::new("b00", "B", "v")).await.unwrap();
        (store, items)
    }

    fn by_partition(pk: &str) -> QuerySpec {
        QuerySpec::new("SELECT * FROM c WHERE c.partitionKey = @pk").with_parameter("@pk", pk)
    }

    #[tokio::test]
    async fn test_read_item_requires_full_identity() {
        let (_, items) = seeded(1).await;
        let found = items.read_item::<TestDoc>("a00", &"A".into()).await.unwrap();
        assert_eq!(found.resource.id, "a00");
        assert!(found.etag.is_some());

        let wrong_pk = items.read_item::<TestDoc>("a00", &"B".into()).await;
        assert!(matches!(wrong_pk, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_pages_are_fetched_lazily() {
        let (store, items) = seeded(5).await;
        let before = store.request_count();
        let mut pager = items.query::<TestDoc>(by_partition("A").with_max_item_count(2));
        assert_eq!(store.request_count(), before, "no request before the first page");

        let first = pager.next_page().await.unwrap().unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more);
        assert_eq!(store.request_count(), before + 1);

        let mut total = first.items.len();
        while let Some(page) = pager.next_page().await {
            total += page.unwrap().items.len();
        }
        assert_eq!(total, 5);
        assert!(pager.is_exhausted());
        assert!(pager.next_page().await.is_none());
    }

    #[tokio::test]
    async fn test_fault_blocks_until_restart() {
        let (store, items) = seeded(4).await;
        let mut pager = items.query::<TestDoc>(by_partition("A").with_max_item_count(2));

        pager.next_page().await.unwrap().unwrap();
        store.fail_next(1);
        assert!(matches!(pager.next_page().await, Some(Err(StoreError::Internal { .. }))));
        assert!(pager.is_faulted());
        assert!(matches!(pager.next_page().await, Some(Err(StoreError::QueryFaulted))));

        pager.restart();
        let all: Vec<String> = {
            let mut ids = Vec::new();
            while let Some(page) = pager.next_page().await {
                ids.extend(page.unwrap().items.into_iter().map(|d| d.id));
            }
            ids
        };
        assert_eq!(all, vec!["a00", "a01", "a02", "a03"]);
    }

    #[tokio::test]
    async fn test_throttled_page_is_retried_not_faulted() {
        let (store, items) = seeded(3).await;
        let mut pager = items.query::<TestDoc>(by_partition("A"));
        store.throttle_next(1, Some(Duration::from_millis(1)));

        let page = pager.next_page().await.unwrap().unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(!pager.is_faulted());
    }

    #[tokio::test]
    async fn test_stream_yields_every_item_across_pages() {
        let (_, items) = seeded(7).await;
        let ids: Vec<String> = items
            .query::<TestDoc>(by_partition("A").with_max_item_count(3))
            .into_stream()
            .map(|item| item.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids.len(), 7);
        assert!(ids.iter().all(|id| id.starts_with('a')));
    }

    #[tokio::test]
    async fn test_stream_ends_after_error() {
        let (store, items) = seeded(4).await;
        let stream = items.query::<TestDoc>(by_partition("A").with_max_item_count(2)).into_stream();
        futures::pin_mut!(stream);

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_ok());
        store.fail_next(1);
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_try_collect_all_with_routing_hint() {
        let (_, items) = seeded(3).await;
        let routed = items
            .query::<TestDoc>(QuerySpec::new("SELECT * FROM c").within_partition("B"))
            .try_collect_all()
            .await
            .unwrap();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].id, "b00");

        let fan_out =
            items.query::<TestDoc>(QuerySpec::new("SELECT * FROM c")).try_collect_all().await.unwrap();
        assert_eq!(fan_out.len(), 4);
    }
}
