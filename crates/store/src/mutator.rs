//! Read-modify-write replaces and deletes.
//!
//! Both replace forms read the current item, let the caller mutate it and
//! write the whole item back. [`replace_with`](ContainerHandle::replace_with)
//! writes unconditionally, so a concurrent update made between the read and
//! the write is lost. [`replace_checked`](ContainerHandle::replace_checked)
//! sends the ETag it read as a precondition and re-runs the cycle when
//! another writer got there first.

use crate::{
    backend::DocumentStore,
    document::Document,
    error::{StoreError, StoreResult},
    retry::with_etag_retry,
    types::{PartitionKey, Response},
    workspace::ContainerHandle,
};

impl<S: DocumentStore> ContainerHandle<S> {
    /// Replaces an item with the result of `mutate`, last writer wins.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] when no item has this identity.
    /// - [`StoreError::BadRequest`] when `mutate` changed the `id` or the partition key. Nothing is
    ///   written in that case; moving an item to another partition means delete and re-create.
    #[tracing::instrument(skip(self, partition_key, mutate), fields(container = %self.link, %partition_key))]
    pub async fn replace_with<T, F>(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        mutate: F,
    ) -> StoreResult<Response<T>>
    where
        T: Document,
        F: FnOnce(&mut T),
    {
        let current = self.read_item::<T>(id, partition_key).await?;
        let mut item = current.resource;
        mutate(&mut item);
        self.write_back(id, partition_key, &item, None).await
    }

    /// Replaces an item with the result of `mutate`, guarded by its ETag.
    ///
    /// When the item changed between the read and the write, the whole
    /// cycle runs again on the fresh version, so `mutate` may be called more
    /// than once.
    ///
    /// # Errors
    ///
    /// - [`StoreError::RetriesExhausted`] when every attempt lost the race.
    /// - Everything [`replace_with`](Self::replace_with) returns.
    #[tracing::instrument(skip(self, partition_key, mutate), fields(container = %self.link, %partition_key))]
    pub async fn replace_checked<T, F>(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        mutate: F,
    ) -> StoreResult<Response<T>>
    where
        T: Document,
        F: Fn(&mut T) + Send + Sync,
    {
        let this = self;
        let mutate = &mutate;
        with_etag_retry(self.workspace.etag_retry_config(), move || async move {
            let current = this.read_item::<T>(id, partition_key).await?;
            let etag = current.etag;
            let mut item = current.resource;
            mutate(&mut item);
            this.write_back(id, partition_key, &item, etag.as_deref()).await
        })
        .await
    }

    /// Deletes an item by its full identity.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] when no item has this identity.
    /// - [`StoreError::Timeout`] or [`StoreError::Connection`] when the outcome is unknown. The
    ///   delete is not replayed, so a delete that landed never comes back as `NotFound`.
    #[tracing::instrument(skip(self, partition_key), fields(container = %self.link, %partition_key))]
    pub async fn delete_item(&self, id: &str, partition_key: &PartitionKey) -> StoreResult<Response<()>> {
        let store = self.workspace.store();
        let link = &self.link;
        let response = self
            .workspace
            .metered_write("delete_item", move || store.delete_item(link, id, partition_key))
            .await?;
        tracing::info!(request_charge = response.request_charge, "item deleted");
        Ok(response)
    }

    async fn write_back<T: Document>(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        item: &T,
        if_match: Option<&str>,
    ) -> StoreResult<Response<T>> {
        if item.id() != id || &item.partition_key() != partition_key {
            return Err(StoreError::bad_request(format!(
                "mutation changed the identity of {}; delete and re-create instead",
                self.link.item_link(id)
            )));
        }

        let body = serde_json::to_value(item)?;
        let store = self.workspace.store();
        let link = &self.link;
        let call = move || store.replace_item(link, id, partition_key, body.clone(), if_match);
        // A conditional write replayed after it landed would fail its own
        // precondition and re-run the mutation.
        let response = if if_match.is_some() {
            self.workspace.metered_write("replace_item", call).await?
        } else {
            self.workspace.metered("replace_item", call).await?
        };
        tracing::info!(
            request_charge = response.request_charge,
            versioned = if_match.is_some(),
            "item replaced",
        );
        response.try_map(|value| serde_json::from_value(value).map_err(StoreError::from))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        EtagRetryConfig, Workspace,
        testutil::{TestDoc, provisioned_container},
    };

    #[tokio::test]
    async fn test_replace_with_applies_mutation() {
        let (_, items) = provisioned_container().await;
        items.create_if_absent(&TestDoc::new("a", "P", "old")).await.unwrap();

        let replaced = items
            .replace_with::<TestDoc, _>("a", &"P".into(), |doc| doc.value = "new".into())
            .await
            .unwrap();
        assert_eq!(replaced.resource.value, "new");

        let read = items.read_item::<TestDoc>("a", &"P".into()).await.unwrap();
        assert_eq!(read.resource, TestDoc::new("a", "P", "new"));
    }

    #[tokio::test]
    async fn test_replace_requires_full_identity() {
        let (_, items) = provisioned_container().await;
        items.create_if_absent(&TestDoc::new("a", "P", "old")).await.unwrap();

        let wrong_pk =
            items.replace_with::<TestDoc, _>("a", &"Q".into(), |doc| doc.value = "x".into()).await;
        assert!(matches!(wrong_pk, Err(StoreError::NotFound { .. })));

        let wrong_id =
            items.replace_with::<TestDoc, _>("b", &"P".into(), |doc| doc.value = "x".into()).await;
        assert!(matches!(wrong_id, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_replace_rejects_identity_change_before_writing() {
        let (store, items) = provisioned_container().await;
        items.create_if_absent(&TestDoc::new("a", "P", "old")).await.unwrap();
        let before = store.request_count();

        let moved = items
            .replace_with::<TestDoc, _>("a", &"P".into(), |doc| doc.partition_key = "Q".into())
            .await;
        assert!(matches!(moved, Err(StoreError::BadRequest { .. })));
        // Only the read reached the store.
        assert_eq!(store.request_count(), before + 1);

        let renamed =
            items.replace_checked::<TestDoc, _>("a", &"P".into(), |doc| doc.id = "b".into()).await;
        assert!(matches!(renamed, Err(StoreError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn test_replace_checked_rereads_after_concurrent_write() {
        let (store, items) = provisioned_container().await;
        items.create_if_absent(&TestDoc::new("a", "P", "v0")).await.unwrap();

        let calls = AtomicU32::new(0);
        let replaced = items
            .replace_checked::<TestDoc, _>("a", &"P".into(), |doc| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    // Simulate another writer landing between our read and write.
                    let sneaky = serde_json::json!({"id": "a", "partitionKey": "P", "value": "other"});
                    futures::executor::block_on(store.replace_item(
                        items.link(),
                        "a",
                        &"P".into(),
                        sneaky,
                        None,
                    ))
                    .unwrap();
                }
                doc.value = format!("{}+mine", doc.value);
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(replaced.resource.value, "other+mine");
    }

    #[tokio::test]
    async fn test_replace_checked_gives_up_after_retries() {
        let (store, _) = provisioned_container().await;
        let workspace = Workspace::new(store.clone()).with_etag_retry_config(
            EtagRetryConfig::builder().max_retries(1).base_delay(std::time::Duration::ZERO).build(),
        );
        let items = workspace.database("db").container("items", Default::default());
        items.create_if_absent(&TestDoc::new("a", "P", "v0")).await.unwrap();

        let result = items
            .replace_checked::<TestDoc, _>("a", &"P".into(), |doc| {
                let bump = serde_json::json!({"id": "a", "partitionKey": "P", "value": "bump"});
                futures::executor::block_on(store.replace_item(
                    items.link(),
                    "a",
                    &"P".into(),
                    bump,
                    None,
                ))
                .unwrap();
                doc.value = "mine".into();
            })
            .await;

        match result {
            Err(StoreError::RetriesExhausted { attempts }) => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_with_lost_ack_is_not_replayed() {
        let (store, items) = provisioned_container().await;
        items.create_if_absent(&TestDoc::new("a", "P", "v0")).await.unwrap();
        let before = store.request_count();
        store.lose_next_acks(1);

        let result = items.delete_item("a", &"P".into()).await;
        assert!(matches!(result, Err(StoreError::Timeout)), "got: {result:?}");
        assert_eq!(store.request_count(), before + 1);
        assert!(matches!(
            items.read_item::<TestDoc>("a", &"P".into()).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_checked_replace_with_lost_ack_runs_mutation_once() {
        let (_, items) = provisioned_container().await;
        items.create_if_absent(&TestDoc::new("a", "P", "v")).await.unwrap();
        items.workspace().store().lose_next_acks(1);

        let calls = AtomicU32::new(0);
        let result = items
            .replace_checked::<TestDoc, _>("a", &"P".into(), |doc| {
                calls.fetch_add(1, Ordering::SeqCst);
                doc.value.push('+');
            })
            .await;

        assert!(matches!(result, Err(StoreError::Timeout)), "got: {result:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let read = items.read_item::<TestDoc>("a", &"P".into()).await.unwrap();
        assert_eq!(read.resource.value, "v+");
    }

    #[tokio::test]
    async fn test_delete_then_recreate_starts_fresh() {
        let (_, items) = provisioned_container().await;
        items.create_if_absent(&TestDoc::new("a", "P", "v0")).await.unwrap();
        items.replace_with::<TestDoc, _>("a", &"P".into(), |d| d.value = "v1".into()).await.unwrap();

        items.delete_item("a", &"P".into()).await.unwrap();
        assert!(matches!(
            items.read_item::<TestDoc>("a", &"P".into()).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(items.delete_item("a", &"P".into()).await, Err(StoreError::NotFound { .. })));

        let again = items.create_if_absent(&TestDoc::new("a", "P", "fresh")).await.unwrap();
        assert!(again.created);
        assert_eq!(again.resource.value, "fresh");
    }
}
