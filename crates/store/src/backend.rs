//! Document store trait definition.
//!
//! [`DocumentStore`] is the service connection handle: the single, opaque
//! collaborator every access-pattern component talks to. Implementations
//! translate each call into a request against a partitioned document service
//! and map the answer onto [`Response`] or [`StoreError`].
//!
//! # Design
//!
//! - **Documents are JSON values**: the trait does not know about domain types. Typed encoding
//!   happens in the access layer (see [`Document`](crate::Document)).
//! - **Async by default**: every operation is a remote request.
//! - **Identity is `(id, partition key)`**: point operations take both halves.
//! - **Thin**: no retries, no existence checks. Those belong to the access layer built on top.
//!
//! # Implementing a Store
//!
//! 1. Implement [`DocumentStore`]
//! 2. Map service statuses with [`StoreError::from_status`]
//! 3. Run the [`conformance`](crate::conformance) suite against it
//!
//! See [`MemoryStore`](crate::MemoryStore) for a reference implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{StoreError, StoreResult},
    types::{
        ContainerLink, ContainerProperties, ContainerSpec, DatabaseProperties, PartitionKey,
        QueryRequest, Response,
    },
};

/// Connection to a partitioned document service.
///
/// Implementations are `Send + Sync` and safe to share between concurrently
/// running requests; one handle is created per process and released with
/// [`shutdown`](DocumentStore::shutdown).
///
/// # Operations
///
/// | Method | Failure modes callers branch on |
/// |--------|---------------------------------|
/// | [`create_database_if_not_exists`](DocumentStore::create_database_if_not_exists) | none |
/// | [`delete_database`](DocumentStore::delete_database) | `NotFound` |
/// | [`create_container_if_not_exists`](DocumentStore::create_container_if_not_exists) | `NotFound` (database) |
/// | [`read_throughput`](DocumentStore::read_throughput) | `BadRequest` (no adjustable capacity) |
/// | [`replace_throughput`](DocumentStore::replace_throughput) | `BadRequest` |
/// | [`read_item`](DocumentStore::read_item) | `NotFound` |
/// | [`create_item`](DocumentStore::create_item) | `Conflict`, `BadRequest` |
/// | [`replace_item`](DocumentStore::replace_item) | `NotFound`, `PreconditionFailed`, `BadRequest` |
/// | [`delete_item`](DocumentStore::delete_item) | `NotFound` |
/// | [`query_items`](DocumentStore::query_items) | `BadRequest` |
///
/// # Example
///
/// ```
/// use docshard_store::{ContainerLink, ContainerSpec, DocumentStore, MemoryStore, PartitionKey};
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// store.create_database_if_not_exists("ToDoList").await.unwrap();
/// store
///     .create_container_if_not_exists("ToDoList", &ContainerSpec::builder().id("Items").build())
///     .await
///     .unwrap();
///
/// let link = ContainerLink::new("ToDoList", "Items");
/// let pk = PartitionKey::from("Andersen");
/// let doc = json!({"id": "Andersen.1", "partitionKey": "Andersen"});
/// store.create_item(&link, &pk, doc).await.unwrap();
///
/// let read = store.read_item(&link, "Andersen.1", &pk).await.unwrap();
/// assert_eq!(read.resource["id"], "Andersen.1");
/// # });
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the database unless it already exists.
    ///
    /// Answers `201 Created` when this call created it and `200 OK` when it
    /// was already there. Concurrent callers never create duplicates.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn create_database_if_not_exists(
        &self,
        id: &str,
    ) -> StoreResult<Response<DatabaseProperties>>;

    /// Deletes the database and everything in it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the database does not exist.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn delete_database(&self, id: &str) -> StoreResult<Response<()>>;

    /// Creates the container unless it already exists.
    ///
    /// The partition-key path and throughput of `spec` only apply when the
    /// container is created; an existing container keeps its own.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when `database` does not exist.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn create_container_if_not_exists(
        &self,
        database: &str,
        spec: &ContainerSpec,
    ) -> StoreResult<Response<ContainerProperties>>;

    /// Reads the container's dedicated throughput in RU/s.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ru))` for manually provisioned containers
    /// - `Ok(None)` when the container shares its database's throughput
    /// - `Err(StoreError::BadRequest)` when the account has no adjustable throughput at all
    #[must_use = "store operations may fail and errors must be handled"]
    async fn read_throughput(&self, container: &ContainerLink) -> StoreResult<Response<Option<u32>>>;

    /// Replaces the container's dedicated throughput.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadRequest`] when the container has no dedicated
    /// throughput or `throughput` is below
    /// [`MIN_THROUGHPUT`](crate::MIN_THROUGHPUT).
    #[must_use = "store operations may fail and errors must be handled"]
    async fn replace_throughput(
        &self,
        container: &ContainerLink,
        throughput: u32,
    ) -> StoreResult<Response<u32>>;

    /// Point-reads an item by its full identity.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] unless an item with this `id` exists in
    /// this partition.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn read_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Response<Value>>;

    /// Creates an item.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] when the identity is taken.
    /// - [`StoreError::BadRequest`] when the document has no string `id` or its partition-key
    ///   field does not equal `partition_key`.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn create_item(
        &self,
        container: &ContainerLink,
        partition_key: &PartitionKey,
        document: Value,
    ) -> StoreResult<Response<Value>>;

    /// Replaces an existing item with `document`.
    ///
    /// With `if_match` the replace only applies when the stored ETag still
    /// equals it; without it the last writer wins.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] when the item does not exist.
    /// - [`StoreError::PreconditionFailed`] when `if_match` is stale.
    /// - [`StoreError::BadRequest`] when `document` changes the `id` or the partition key.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn replace_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
        document: Value,
        if_match: Option<&str>,
    ) -> StoreResult<Response<Value>>;

    /// Deletes an item.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the item does not exist.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn delete_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Response<()>>;

    /// Fetches one page of query results.
    ///
    /// The returned [`Response::continuation`] is `None` on the last page.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn query_items(
        &self,
        container: &ContainerLink,
        request: &QueryRequest,
    ) -> StoreResult<Response<Vec<Value>>>;

    /// Releases the connection. Later calls fail with
    /// [`StoreError::Closed`]. Idempotent.
    async fn shutdown(&self) -> StoreResult<()>;

    /// Point-reads an item and decodes it into `T`.
    ///
    /// Convenience wrapper around [`read_item`](DocumentStore::read_item).
    ///
    /// # Errors
    ///
    /// Everything [`read_item`](DocumentStore::read_item) returns, plus
    /// [`StoreError::Serialization`] when the stored JSON does not decode.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn read_item_as<T>(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Response<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.read_item(container, id, partition_key)
            .await?
            .try_map(|value| serde_json::from_value(value).map_err(StoreError::from))
    }
}
