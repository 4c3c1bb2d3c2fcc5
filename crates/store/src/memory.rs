//! In-memory document store emulator.
//!
//! This module provides [`MemoryStore`], an in-memory implementation of
//! [`DocumentStore`] suitable for tests, local development and running the
//! walkthrough without a service account.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Partitioned**: Items live in per-partition [`BTreeMap`]s keyed by id, so identity is the
//!   (id, partition key) pair and iteration order is deterministic
//! - **System properties**: Every write stamps `_etag` and `_ts` and bumps the ETag
//! - **Request charges**: Deterministic, size-dependent costs on every response
//! - **Queries**: The filter subset described in [`filter`](crate::filter), paged with opaque
//!   continuation tokens, routed to one partition when the key is pinned
//! - **Fault injection**: [`throttle_next`](MemoryStore::throttle_next) and
//!   [`fail_next`](MemoryStore::fail_next) make upcoming calls fail
//!
//! # Example
//!
//! ```
//! use docshard_store::{ContainerLink, ContainerSpec, DocumentStore, MemoryStore, QueryRequest};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MemoryStore::new();
//! store.create_database_if_not_exists("ToDoList").await.unwrap();
//! let spec = ContainerSpec::builder().id("Items").build();
//! store.create_container_if_not_exists("ToDoList", &spec).await.unwrap();
//!
//! let link = ContainerLink::new("ToDoList", "Items");
//! let doc = json!({"id": "Andersen.1", "partitionKey": "Andersen"});
//! store.create_item(&link, &"Andersen".into(), doc).await.unwrap();
//!
//! let request = QueryRequest {
//!     query: "SELECT * FROM c WHERE c.partitionKey = 'Andersen'".into(),
//!     ..Default::default()
//! };
//! let page = store.query_items(&link, &request).await.unwrap();
//! assert_eq!(page.resource.len(), 1);
//! assert!(page.continuation.is_none());
//! # });
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Only the query subset above is understood; anything else is a bad request
//! - Continuation tokens are offsets, so concurrent writes can shift pages

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::{
    backend::DocumentStore,
    error::{StoreError, StoreResult},
    filter::Filter,
    types::{
        ContainerLink, ContainerProperties, ContainerSpec, DatabaseProperties, MIN_THROUGHPUT,
        PartitionKey, PartitionKeyPath, QueryRequest, Response, ThroughputSpec,
    },
};

const DEFAULT_PAGE_SIZE: usize = 100;
const CONTINUATION_PREFIX: &str = "offset:";

const POINT_READ_CHARGE: f64 = 1.0;
const CREATE_CHARGE: f64 = 6.0;
const REPLACE_CHARGE: f64 = 10.0;
const DELETE_CHARGE: f64 = 6.0;
const WRITE_CHARGE_PER_KB: f64 = 0.5;
const QUERY_BASE_CHARGE: f64 = 2.5;
const QUERY_PARTITION_CHARGE: f64 = 1.0;
const QUERY_DOCUMENT_CHARGE: f64 = 0.1;
const METADATA_READ_CHARGE: f64 = 1.0;
const METADATA_WRITE_CHARGE: f64 = 5.0;

#[derive(Debug, Default)]
struct Account {
    databases: BTreeMap<String, Database>,
}

#[derive(Debug)]
struct Database {
    rid: String,
    containers: BTreeMap<String, Container>,
}

#[derive(Debug)]
struct Container {
    rid: String,
    partition_key_path: PartitionKeyPath,
    throughput: ThroughputSpec,
    /// partition key value -> id -> item
    partitions: BTreeMap<String, BTreeMap<String, StoredItem>>,
}

impl Container {
    fn properties(&self, id: &str) -> ContainerProperties {
        ContainerProperties {
            id: id.to_owned(),
            partition_key_path: self.partition_key_path.clone(),
            rid: Some(self.rid.clone()),
        }
    }

    fn item(&self, id: &str, partition_key: &PartitionKey) -> Option<&StoredItem> {
        self.partitions.get(partition_key.as_str()).and_then(|p| p.get(id))
    }
}

#[derive(Debug, Clone)]
struct StoredItem {
    body: Value,
    etag: String,
}

#[derive(Debug, Default)]
struct Faults {
    throttled: u32,
    retry_after: Option<Duration>,
    failing: u32,
    lost_acks: u32,
}

/// In-memory, partitioned document store.
///
/// # Cloning
///
/// `MemoryStore` is cheaply cloneable via [`Arc`]. All clones share the same
/// account, fault schedule and shutdown state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    account: Arc<RwLock<Account>>,
    faults: Arc<Mutex<Faults>>,
    sequence: Arc<AtomicU64>,
    requests: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("databases", &self.account.read().databases.len())
            .field("requests", &self.request_count())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls fail with [`StoreError::RateLimited`]
    /// carrying `retry_after`.
    pub fn throttle_next(&self, count: u32, retry_after: Option<Duration>) {
        let mut faults = self.faults.lock();
        faults.throttled = count;
        faults.retry_after = retry_after;
    }

    /// Makes the next `count` calls fail with a non-transient
    /// [`StoreError::Internal`].
    pub fn fail_next(&self, count: u32) {
        self.faults.lock().failing = count;
    }

    /// Applies the next `count` writes but answers each of them with
    /// [`StoreError::Timeout`], as when a response is lost on the way back.
    pub fn lose_next_acks(&self, count: u32) {
        self.faults.lock().lost_acks = count;
    }

    /// Returns how many calls the store has received, including failed
    /// ones.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Returns `true` once [`shutdown`](DocumentStore::shutdown) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reads a database's properties.
    ///
    /// Not part of [`DocumentStore`]; service fakes built on the emulator
    /// use it to answer plain reads.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the database does not exist.
    pub fn read_database(&self, id: &str) -> StoreResult<Response<DatabaseProperties>> {
        self.admit()?;
        let account = self.account.read();
        let db = account.databases.get(id).ok_or_else(|| StoreError::not_found(format!("dbs/{id}")))?;
        let props = DatabaseProperties { id: id.to_owned(), rid: Some(db.rid.clone()) };
        Ok(Response::new(props, StatusCode::OK, METADATA_READ_CHARGE))
    }

    /// Reads a container's properties.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the database or the container does not
    /// exist.
    pub fn read_container(&self, link: &ContainerLink) -> StoreResult<Response<ContainerProperties>> {
        self.admit()?;
        let account = self.account.read();
        let target = container(&account, link)?;
        Ok(Response::new(target.properties(link.container()), StatusCode::OK, METADATA_READ_CHARGE))
    }

    /// Accounts for a call and applies shutdown and injected faults.
    fn admit(&self) -> StoreResult<()> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::closed());
        }

        let mut faults = self.faults.lock();
        if faults.throttled > 0 {
            faults.throttled -= 1;
            return Err(StoreError::rate_limited(faults.retry_after));
        }
        if faults.failing > 0 {
            faults.failing -= 1;
            return Err(StoreError::internal("injected fault"));
        }
        Ok(())
    }

    /// Hands back the answer of an applied write unless its ack is lost.
    fn acknowledge<T>(&self, response: Response<T>) -> StoreResult<Response<T>> {
        let mut faults = self.faults.lock();
        if faults.lost_acks > 0 {
            faults.lost_acks -= 1;
            return Err(StoreError::timeout());
        }
        Ok(response)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn next_rid(&self) -> String {
        format!("rid-{:08x}", self.next_sequence())
    }

    /// Stamps system properties onto `body` and returns the stored form.
    fn stamp(&self, mut body: Value) -> StoredItem {
        let etag = format!("\"{:016x}\"", self.next_sequence());
        if let Value::Object(map) = &mut body {
            map.insert("_etag".to_owned(), Value::String(etag.clone()));
            map.insert("_ts".to_owned(), Value::from(chrono::Utc::now().timestamp()));
        }
        StoredItem { body, etag }
    }
}

fn container<'a>(account: &'a Account, link: &ContainerLink) -> StoreResult<&'a Container> {
    account
        .databases
        .get(link.database())
        .and_then(|db| db.containers.get(link.container()))
        .ok_or_else(|| StoreError::not_found(link.to_string()))
}

fn container_mut<'a>(
    account: &'a mut Account,
    link: &ContainerLink,
) -> StoreResult<&'a mut Container> {
    account
        .databases
        .get_mut(link.database())
        .and_then(|db| db.containers.get_mut(link.container()))
        .ok_or_else(|| StoreError::not_found(link.to_string()))
}

/// Checks that `document` is an object whose `id` and partition-key field
/// agree with the identity the request addresses.
fn validate_identity(
    document: &Value,
    path: &PartitionKeyPath,
    id: Option<&str>,
    partition_key: &PartitionKey,
) -> StoreResult<String> {
    let object: &Map<String, Value> =
        document.as_object().ok_or_else(|| StoreError::bad_request("document must be a JSON object"))?;

    let doc_id = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| StoreError::bad_request("document must carry a non-empty string `id`"))?;

    if let Some(expected) = id
        && doc_id != expected
    {
        return Err(StoreError::bad_request(format!(
            "document id `{doc_id}` does not match addressed id `{expected}`"
        )));
    }

    match path.extract(document) {
        Some(value) if &value == partition_key => Ok(doc_id.to_owned()),
        Some(value) => Err(StoreError::bad_request(format!(
            "partition key `{value}` in document does not match `{partition_key}`"
        ))),
        None => Err(StoreError::bad_request(format!(
            "document has no string partition key at `{path}`"
        ))),
    }
}

fn write_charge(base: f64, body: &Value) -> f64 {
    let kb = body.to_string().len() / 1024;
    round_charge(base + WRITE_CHARGE_PER_KB * kb as f64)
}

fn round_charge(charge: f64) -> f64 {
    (charge * 100.0).round() / 100.0
}

fn parse_continuation(token: Option<&str>) -> StoreResult<usize> {
    match token {
        None => Ok(0),
        Some(token) => token
            .strip_prefix(CONTINUATION_PREFIX)
            .and_then(|offset| offset.parse().ok())
            .ok_or_else(|| StoreError::bad_request(format!("invalid continuation token `{token}`"))),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[tracing::instrument(skip(self))]
    async fn create_database_if_not_exists(
        &self,
        id: &str,
    ) -> StoreResult<Response<DatabaseProperties>> {
        self.admit()?;
        if id.is_empty() {
            return Err(StoreError::bad_request("database id must not be empty"));
        }

        let mut account = self.account.write();
        if let Some(db) = account.databases.get(id) {
            let props = DatabaseProperties { id: id.to_owned(), rid: Some(db.rid.clone()) };
            return Ok(Response::new(props, StatusCode::OK, METADATA_READ_CHARGE));
        }

        let rid = self.next_rid();
        account
            .databases
            .insert(id.to_owned(), Database { rid: rid.clone(), containers: BTreeMap::new() });
        let props = DatabaseProperties { id: id.to_owned(), rid: Some(rid) };
        Ok(Response::new(props, StatusCode::CREATED, METADATA_WRITE_CHARGE))
    }

    #[tracing::instrument(skip(self))]
    async fn delete_database(&self, id: &str) -> StoreResult<Response<()>> {
        self.admit()?;
        let mut account = self.account.write();
        match account.databases.remove(id) {
            Some(_) => self.acknowledge(Response::new((), StatusCode::NO_CONTENT, METADATA_WRITE_CHARGE)),
            None => Err(StoreError::not_found(format!("dbs/{id}"))),
        }
    }

    #[tracing::instrument(skip(self, spec), fields(container = %spec.id))]
    async fn create_container_if_not_exists(
        &self,
        database: &str,
        spec: &ContainerSpec,
    ) -> StoreResult<Response<ContainerProperties>> {
        self.admit()?;
        if spec.id.is_empty() {
            return Err(StoreError::bad_request("container id must not be empty"));
        }
        if let ThroughputSpec::Manual(ru) = spec.throughput
            && ru < MIN_THROUGHPUT
        {
            return Err(StoreError::bad_request(format!(
                "throughput {ru} is below the minimum of {MIN_THROUGHPUT} RU/s"
            )));
        }

        let rid = self.next_rid();
        let mut account = self.account.write();
        let db = account
            .databases
            .get_mut(database)
            .ok_or_else(|| StoreError::not_found(format!("dbs/{database}")))?;

        if let Some(existing) = db.containers.get(&spec.id) {
            return Ok(Response::new(
                existing.properties(&spec.id),
                StatusCode::OK,
                METADATA_READ_CHARGE,
            ));
        }

        let container = Container {
            rid,
            partition_key_path: spec.partition_key_path.clone(),
            throughput: spec.throughput,
            partitions: BTreeMap::new(),
        };
        let props = container.properties(&spec.id);
        db.containers.insert(spec.id.clone(), container);
        Ok(Response::new(props, StatusCode::CREATED, METADATA_WRITE_CHARGE))
    }

    #[tracing::instrument(skip(self), fields(container = %container))]
    async fn read_throughput(&self, container: &ContainerLink) -> StoreResult<Response<Option<u32>>> {
        self.admit()?;
        let account = self.account.read();
        let target = self::container(&account, container)?;
        match target.throughput {
            ThroughputSpec::Manual(ru) => {
                Ok(Response::new(Some(ru), StatusCode::OK, METADATA_READ_CHARGE))
            },
            ThroughputSpec::Shared => Ok(Response::new(None, StatusCode::OK, METADATA_READ_CHARGE)),
            ThroughputSpec::Serverless => Err(StoreError::bad_request(
                "reading or replacing offers is not supported for serverless accounts",
            )),
        }
    }

    #[tracing::instrument(skip(self), fields(container = %container))]
    async fn replace_throughput(
        &self,
        container: &ContainerLink,
        throughput: u32,
    ) -> StoreResult<Response<u32>> {
        self.admit()?;
        let mut account = self.account.write();
        let target = container_mut(&mut account, container)?;
        match target.throughput {
            ThroughputSpec::Manual(_) if throughput < MIN_THROUGHPUT => {
                Err(StoreError::bad_request(format!(
                    "throughput {throughput} is below the minimum of {MIN_THROUGHPUT} RU/s"
                )))
            },
            ThroughputSpec::Manual(_) => {
                target.throughput = ThroughputSpec::Manual(throughput);
                Ok(Response::new(throughput, StatusCode::OK, METADATA_WRITE_CHARGE))
            },
            ThroughputSpec::Shared => Err(StoreError::bad_request(format!(
                "container {container} has no dedicated throughput"
            ))),
            ThroughputSpec::Serverless => Err(StoreError::bad_request(
                "reading or replacing offers is not supported for serverless accounts",
            )),
        }
    }

    #[tracing::instrument(skip(self, partition_key), fields(container = %container))]
    async fn read_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Response<Value>> {
        self.admit()?;
        let account = self.account.read();
        let target = self::container(&account, container)?;
        let item = target
            .item(id, partition_key)
            .ok_or_else(|| StoreError::not_found(container.item_link(id)))?;
        Ok(Response::new(item.body.clone(), StatusCode::OK, POINT_READ_CHARGE)
            .with_etag(Some(item.etag.clone())))
    }

    #[tracing::instrument(skip(self, partition_key, document), fields(container = %container))]
    async fn create_item(
        &self,
        container: &ContainerLink,
        partition_key: &PartitionKey,
        document: Value,
    ) -> StoreResult<Response<Value>> {
        self.admit()?;
        let mut account = self.account.write();
        let target = container_mut(&mut account, container)?;
        let id = validate_identity(&document, &target.partition_key_path, None, partition_key)?;

        let partition = target.partitions.entry(partition_key.as_str().to_owned()).or_default();
        if partition.contains_key(&id) {
            return Err(StoreError::conflict(container.item_link(&id)));
        }

        let charge = write_charge(CREATE_CHARGE, &document);
        let stored = self.stamp(document);
        let response = Response::new(stored.body.clone(), StatusCode::CREATED, charge)
            .with_etag(Some(stored.etag.clone()));
        partition.insert(id, stored);
        self.acknowledge(response)
    }

    #[tracing::instrument(skip(self, partition_key, document, if_match), fields(container = %container))]
    async fn replace_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
        document: Value,
        if_match: Option<&str>,
    ) -> StoreResult<Response<Value>> {
        self.admit()?;
        let mut account = self.account.write();
        let target = container_mut(&mut account, container)?;
        validate_identity(&document, &target.partition_key_path, Some(id), partition_key)?;

        let slot = target
            .partitions
            .get_mut(partition_key.as_str())
            .and_then(|p| p.get_mut(id))
            .ok_or_else(|| StoreError::not_found(container.item_link(id)))?;

        if let Some(expected) = if_match
            && expected != slot.etag
        {
            return Err(StoreError::precondition_failed(container.item_link(id)));
        }

        let charge = write_charge(REPLACE_CHARGE, &document);
        *slot = self.stamp(document);
        self.acknowledge(
            Response::new(slot.body.clone(), StatusCode::OK, charge).with_etag(Some(slot.etag.clone())),
        )
    }

    #[tracing::instrument(skip(self, partition_key), fields(container = %container))]
    async fn delete_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Response<()>> {
        self.admit()?;
        let mut account = self.account.write();
        let target = container_mut(&mut account, container)?;
        let partition = target
            .partitions
            .get_mut(partition_key.as_str())
            .ok_or_else(|| StoreError::not_found(container.item_link(id)))?;
        partition.remove(id).ok_or_else(|| StoreError::not_found(container.item_link(id)))?;
        if partition.is_empty() {
            target.partitions.remove(partition_key.as_str());
        }
        self.acknowledge(Response::new((), StatusCode::NO_CONTENT, DELETE_CHARGE))
    }

    #[tracing::instrument(skip(self, request), fields(container = %container, query = %request.query))]
    async fn query_items(
        &self,
        container: &ContainerLink,
        request: &QueryRequest,
    ) -> StoreResult<Response<Vec<Value>>> {
        self.admit()?;
        let page_size = match request.max_item_count {
            Some(0) => return Err(StoreError::bad_request("max item count must be positive")),
            Some(n) => n as usize,
            None => DEFAULT_PAGE_SIZE,
        };
        let offset = parse_continuation(request.continuation.as_deref())?;
        let filter = Filter::parse(&request.query)?.bind(&request.parameters)?;

        let account = self.account.read();
        let target = self::container(&account, container)?;

        let pinned = request
            .partition_key
            .as_ref()
            .map(PartitionKey::as_str)
            .or_else(|| filter.pinned_partition(&target.partition_key_path));

        let (scanned, matching): (usize, Vec<&Value>) = match pinned {
            Some(key) => {
                let docs = target
                    .partitions
                    .get(key)
                    .into_iter()
                    .flat_map(BTreeMap::values)
                    .map(|item| &item.body)
                    .filter(|body| filter.matches(body))
                    .collect();
                (1, docs)
            },
            None => {
                let docs = target
                    .partitions
                    .values()
                    .flat_map(BTreeMap::values)
                    .map(|item| &item.body)
                    .filter(|body| filter.matches(body))
                    .collect();
                (target.partitions.len().max(1), docs)
            },
        };

        let page: Vec<Value> = matching.iter().skip(offset).take(page_size).map(|v| (*v).clone()).collect();
        let next = offset + page.len();
        let continuation =
            (next < matching.len()).then(|| format!("{CONTINUATION_PREFIX}{next}"));

        let charge = round_charge(
            QUERY_BASE_CHARGE
                + QUERY_PARTITION_CHARGE * (scanned - 1) as f64
                + QUERY_DOCUMENT_CHARGE * page.len() as f64,
        );

        tracing::debug!(
            partitions_scanned = scanned,
            returned = page.len(),
            request_charge = charge,
            "query page served",
        );

        Ok(Response::new(page, StatusCode::OK, charge).with_continuation(continuation))
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn provisioned(throughput: ThroughputSpec) -> (MemoryStore, ContainerLink) {
        let store = MemoryStore::new();
        store.create_database_if_not_exists("db").await.unwrap();
        let spec = ContainerSpec::builder().id("items").throughput(throughput).build();
        store.create_container_if_not_exists("db", &spec).await.unwrap();
        (store, ContainerLink::new("db", "items"))
    }

    fn doc(id: &str, pk: &str) -> Value {
        json!({"id": id, "partitionKey": pk, "lastName": pk})
    }

    #[tokio::test]
    async fn test_create_database_reports_created_then_ok() {
        let store = MemoryStore::new();
        let first = store.create_database_if_not_exists("db").await.unwrap();
        let second = store.create_database_if_not_exists("db").await.unwrap();

        assert_eq!(first.status, StatusCode::CREATED);
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(first.resource.rid, second.resource.rid);
    }

    #[tokio::test]
    async fn test_plain_reads_report_existing_resources() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;

        let db = store.read_database("db").unwrap();
        assert_eq!(db.resource.id, "db");
        assert!(db.resource.rid.is_some());

        let container = store.read_container(&link).unwrap();
        assert_eq!(container.resource.id, "items");
        assert_eq!(container.resource.partition_key_path, PartitionKeyPath::default());

        assert!(matches!(store.read_database("missing"), Err(StoreError::NotFound { .. })));
        let missing = ContainerLink::new("db", "missing");
        assert!(matches!(store.read_container(&missing), Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_container_requires_database() {
        let store = MemoryStore::new();
        let spec = ContainerSpec::builder().id("items").build();
        let result = store.create_container_if_not_exists("missing", &spec).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_existing_container_keeps_its_partition_key_path() {
        let (store, _) = provisioned(ThroughputSpec::default()).await;
        let other = ContainerSpec::builder()
            .id("items")
            .partition_key_path(PartitionKeyPath::new("/lastName").unwrap())
            .build();

        let response = store.create_container_if_not_exists("db", &other).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.resource.partition_key_path.as_str(), "/partitionKey");
    }

    #[tokio::test]
    async fn test_identity_is_id_and_partition_key() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        store.create_item(&link, &"A".into(), doc("x", "A")).await.unwrap();
        store.create_item(&link, &"B".into(), doc("x", "B")).await.unwrap();

        let a = store.read_item(&link, "x", &"A".into()).await.unwrap();
        assert_eq!(a.resource["partitionKey"], "A");

        let missing = store.read_item(&link, "x", &"C".into()).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_mismatched_partition_key() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;

        let result = store.create_item(&link, &"B".into(), doc("x", "A")).await;
        assert!(matches!(result, Err(StoreError::BadRequest { .. })));

        let result = store.create_item(&link, &"A".into(), json!({"partitionKey": "A"})).await;
        assert!(matches!(result, Err(StoreError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        store.create_item(&link, &"A".into(), doc("x", "A")).await.unwrap();
        let result = store.create_item(&link, &"A".into(), doc("x", "A")).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_writes_stamp_system_properties_and_bump_etag() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        let created = store.create_item(&link, &"A".into(), doc("x", "A")).await.unwrap();
        let etag = created.etag.clone().unwrap();
        assert_eq!(created.resource["_etag"], etag.as_str());
        assert!(created.resource["_ts"].is_i64());

        let replaced =
            store.replace_item(&link, "x", &"A".into(), doc("x", "A"), Some(&etag)).await.unwrap();
        assert_ne!(replaced.etag.as_deref(), Some(etag.as_str()));

        let stale = store.replace_item(&link, "x", &"A".into(), doc("x", "A"), Some(&etag)).await;
        assert!(matches!(stale, Err(StoreError::PreconditionFailed { .. })));
    }

    #[tokio::test]
    async fn test_replace_rejects_identity_change() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        store.create_item(&link, &"A".into(), doc("x", "A")).await.unwrap();

        let moved = store.replace_item(&link, "x", &"A".into(), doc("x", "B"), None).await;
        assert!(matches!(moved, Err(StoreError::BadRequest { .. })));

        let renamed = store.replace_item(&link, "x", &"A".into(), doc("y", "A"), None).await;
        assert!(matches!(renamed, Err(StoreError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn test_charges_scale_with_document_size() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        let small = store.create_item(&link, &"A".into(), doc("small", "A")).await.unwrap();
        let big_body = json!({"id": "big", "partitionKey": "A", "blob": "x".repeat(4096)});
        let big = store.create_item(&link, &"A".into(), big_body).await.unwrap();
        let read = store.read_item(&link, "small", &"A".into()).await.unwrap();

        assert_eq!(read.request_charge, POINT_READ_CHARGE);
        assert!(small.request_charge > read.request_charge);
        assert!(big.request_charge > small.request_charge);
    }

    #[tokio::test]
    async fn test_throughput_modes() {
        let (manual, link) = provisioned(ThroughputSpec::Manual(400)).await;
        assert_eq!(manual.read_throughput(&link).await.unwrap().resource, Some(400));
        assert_eq!(manual.replace_throughput(&link, 500).await.unwrap().resource, 500);
        assert_eq!(manual.read_throughput(&link).await.unwrap().resource, Some(500));
        assert!(matches!(
            manual.replace_throughput(&link, 300).await,
            Err(StoreError::BadRequest { .. })
        ));

        let (shared, link) = provisioned(ThroughputSpec::Shared).await;
        assert_eq!(shared.read_throughput(&link).await.unwrap().resource, None);
        assert!(shared.replace_throughput(&link, 500).await.is_err());

        let (serverless, link) = provisioned(ThroughputSpec::Serverless).await;
        assert!(matches!(
            serverless.read_throughput(&link).await,
            Err(StoreError::BadRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_pages_with_continuation() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        for i in 0..5 {
            store.create_item(&link, &"A".into(), doc(&format!("a{i}"), "A")).await.unwrap();
        }
        store.create_item(&link, &"B".into(), doc("b0", "B")).await.unwrap();

        let mut request = QueryRequest {
            query: "SELECT * FROM c WHERE c.partitionKey = 'A'".into(),
            max_item_count: Some(2),
            ..Default::default()
        };

        let mut ids = Vec::new();
        let mut pages = 0;
        loop {
            let page = store.query_items(&link, &request).await.unwrap();
            pages += 1;
            ids.extend(page.resource.iter().map(|d| d["id"].as_str().unwrap().to_owned()));
            match page.continuation {
                Some(token) => request.continuation = Some(token),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(ids, vec!["a0", "a1", "a2", "a3", "a4"]);
    }

    #[tokio::test]
    async fn test_fan_out_costs_more_than_routed_query() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        for pk in ["A", "B", "C"] {
            store.create_item(&link, &pk.into(), doc("x", pk)).await.unwrap();
        }

        let routed = QueryRequest {
            query: "SELECT * FROM c WHERE c.lastName = 'A'".into(),
            partition_key: Some("A".into()),
            ..Default::default()
        };
        let fan_out = QueryRequest {
            query: "SELECT * FROM c WHERE c.lastName = 'A'".into(),
            ..Default::default()
        };

        let routed = store.query_items(&link, &routed).await.unwrap();
        let fan_out = store.query_items(&link, &fan_out).await.unwrap();
        assert_eq!(routed.resource, fan_out.resource);
        assert!(fan_out.request_charge > routed.request_charge);
    }

    #[tokio::test]
    async fn test_query_rejects_bad_input() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        let bad_token = QueryRequest {
            query: "SELECT * FROM c".into(),
            continuation: Some("garbage".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.query_items(&link, &bad_token).await,
            Err(StoreError::BadRequest { .. })
        ));

        let zero_page =
            QueryRequest { query: "SELECT * FROM c".into(), max_item_count: Some(0), ..Default::default() };
        assert!(store.query_items(&link, &zero_page).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_database_cascades() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        store.create_item(&link, &"A".into(), doc("x", "A")).await.unwrap();
        store.delete_database("db").await.unwrap();

        assert!(matches!(
            store.read_item(&link, "x", &"A".into()).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(store.delete_database("db").await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let (store, link) = provisioned(ThroughputSpec::default()).await;
        store.throttle_next(1, Some(Duration::from_millis(5)));
        store.fail_next(1);

        let first = store.read_throughput(&link).await;
        assert_eq!(first.unwrap_err().retry_after(), Some(Duration::from_millis(5)));
        assert!(matches!(store.read_throughput(&link).await, Err(StoreError::Internal { .. })));
        assert!(store.read_throughput(&link).await.is_ok());
    }

    #[tokio::test]
    async fn test_lost_ack_still_applies_the_write() {
        let (store, link) = provisioned(ThroughputSpec::Manual(400)).await;
        store.lose_next_acks(1);

        let result = store.create_item(&link, &"P".into(), json!({"id": "a", "partitionKey": "P"})).await;
        assert!(matches!(result, Err(StoreError::Timeout)));
        assert!(store.read_item(&link, "a", &"P".into()).await.is_ok());

        store.lose_next_acks(1);
        assert!(matches!(store.delete_item(&link, "a", &"P".into()).await, Err(StoreError::Timeout)));
        assert!(matches!(store.read_item(&link, "a", &"P".into()).await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_clones() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.shutdown().await.unwrap();
        store.shutdown().await.unwrap();

        assert!(clone.is_closed());
        assert!(matches!(
            clone.create_database_if_not_exists("db").await,
            Err(StoreError::Closed)
        ));
    }

    mod proptests {
        use std::collections::BTreeSet;

        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// Following continuation tokens visits every matching item
            /// exactly once, whatever the page size.
            #[test]
            fn paging_visits_every_match_once(
                items in proptest::collection::btree_set(("[a-c]", "[a-z]{1,6}"), 0..40),
                page_size in 1u32..7,
                routed in any::<bool>(),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");

                rt.block_on(async {
                    let (store, link) = provisioned(ThroughputSpec::default()).await;
                    for (pk, id) in &items {
                        store.create_item(&link, &pk.as_str().into(), doc(id, pk)).await.unwrap();
                    }

                    let mut request = QueryRequest {
                        query: "SELECT * FROM c WHERE c.partitionKey = @pk".into(),
                        parameters: vec![crate::types::QueryParameter {
                            name: "@pk".into(),
                            value: json!("a"),
                        }],
                        partition_key: routed.then(|| PartitionKey::from("a")),
                        max_item_count: Some(page_size),
                        continuation: None,
                    };

                    let mut seen = Vec::new();
                    loop {
                        let page = store.query_items(&link, &request).await.unwrap();
                        prop_assert!(page.resource.len() <= page_size as usize);
                        seen.extend(
                            page.resource.iter().map(|d| d["id"].as_str().unwrap().to_owned()),
                        );
                        match page.continuation {
                            Some(token) => request.continuation = Some(token),
                            None => break,
                        }
                    }

                    let expected: BTreeSet<String> = items
                        .iter()
                        .filter(|(pk, _)| pk == "a")
                        .map(|(_, id)| id.clone())
                        .collect();
                    let unique: BTreeSet<String> = seen.iter().cloned().collect();
                    prop_assert_eq!(unique.len(), seen.len());
                    prop_assert_eq!(unique, expected);
                    Ok(())
                })?;
            }
        }
    }
}
