//! Conformance test suite for [`DocumentStore`] implementations.
//!
//! Each function takes a fresh, empty store, provisions what it needs under
//! [`TEST_DATABASE`](crate::testutil::TEST_DATABASE) and checks one aspect of
//! the trait contract. The in-memory emulator and the REST client run the
//! same suite, so code tested against one behaves the same on the other.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with
//! a fresh store:
//!
//! ```no_run
//! use docshard_store::{MemoryStore, conformance};
//!
//! #[tokio::test]
//! async fn items_read_missing_is_not_found() {
//!     conformance::items_read_missing_is_not_found(&MemoryStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Functions | Contract aspect |
//! |----------|-----------|-----------------|
//! | Provisioning | 4 tests | Create-if-absent databases and containers, cascading delete |
//! | Items | 9 tests | Identity, conflicts, replace preconditions, delete |
//! | Throughput | 2 tests | Read and replace dedicated RU/s |
//! | Query | 3 tests | Paging, partition routing, syntax errors |
//! | Lifecycle | 2 tests | Charges and shutdown |

use http::StatusCode;
use serde_json::{Value, json};

use crate::{
    assert_bad_request, assert_conflict, assert_not_found,
    backend::DocumentStore,
    error::StoreError,
    testutil::{TEST_CONTAINER, TEST_DATABASE, provision},
    types::{
        ContainerLink, ContainerSpec, PartitionKey, PartitionKeyPath, QueryParameter, QueryRequest,
        ThroughputSpec,
    },
};

fn item(id: &str, partition_key: &str, value: i64) -> Value {
    json!({"id": id, "partitionKey": partition_key, "value": value})
}

async fn items_container<S: DocumentStore>(store: &S) -> ContainerLink {
    provision(store, ContainerSpec::builder().id(TEST_CONTAINER).build()).await
}

// ============================================================================
// Provisioning: create-if-absent and cascading delete (4 tests)
// ============================================================================

/// Creating a database twice answers `201` then `200`.
pub async fn provisioning_create_database_is_idempotent<S: DocumentStore>(store: &S) {
    let first = store.create_database_if_not_exists(TEST_DATABASE).await.expect("first create");
    let second = store.create_database_if_not_exists(TEST_DATABASE).await.expect("second create");

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.resource.id, TEST_DATABASE);
}

/// A container cannot be created in a missing database.
pub async fn provisioning_container_requires_database<S: DocumentStore>(store: &S) {
    let spec = ContainerSpec::builder().id(TEST_CONTAINER).build();
    let result = store.create_container_if_not_exists("missing", &spec).await;
    assert_not_found!(result, "container in missing database");
}

/// An existing container keeps its partition-key path.
pub async fn provisioning_existing_container_keeps_definition<S: DocumentStore>(store: &S) {
    items_container(store).await;

    let other = ContainerSpec::builder()
        .id(TEST_CONTAINER)
        .partition_key_path(PartitionKeyPath::new("/lastName").expect("valid path"))
        .build();
    let response =
        store.create_container_if_not_exists(TEST_DATABASE, &other).await.expect("second create");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.resource.partition_key_path, PartitionKeyPath::default());
}

/// Deleting a database removes its containers and items; a second delete is
/// `NotFound`.
pub async fn provisioning_delete_database_cascades<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    store.create_item(&link, &"P".into(), item("a", "P", 1)).await.expect("create item");

    store.delete_database(TEST_DATABASE).await.expect("delete database");
    assert_not_found!(store.read_item(&link, "a", &"P".into()).await, "item after cascade");
    assert_not_found!(store.delete_database(TEST_DATABASE).await, "second delete");

    let recreated = store.create_database_if_not_exists(TEST_DATABASE).await.expect("recreate");
    assert_eq!(recreated.status, StatusCode::CREATED);
}

// ============================================================================
// Items: identity, conflicts and replace preconditions (9 tests)
// ============================================================================

/// Reading an item that was never written is `NotFound`.
pub async fn items_read_missing_is_not_found<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    assert_not_found!(store.read_item(&link, "ghost", &"P".into()).await);
}

/// A created item reads back with its body, a `201` status and an ETag.
pub async fn items_create_then_read_roundtrips<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    let pk = PartitionKey::from("P");

    let created = store.create_item(&link, &pk, item("a", "P", 7)).await.expect("create");
    assert_eq!(created.status, StatusCode::CREATED);
    assert!(created.etag.is_some(), "create should return an etag");

    let read = store.read_item(&link, "a", &pk).await.expect("read");
    assert_eq!(read.resource["id"], "a");
    assert_eq!(read.resource["value"], 7);
    assert_eq!(read.etag, created.etag);
}

/// The same id in two partitions names two distinct items.
pub async fn items_identity_requires_both_halves<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    store.create_item(&link, &"P".into(), item("a", "P", 1)).await.expect("create in P");
    store.create_item(&link, &"Q".into(), item("a", "Q", 2)).await.expect("create in Q");

    let p = store.read_item(&link, "a", &"P".into()).await.expect("read P");
    let q = store.read_item(&link, "a", &"Q".into()).await.expect("read Q");
    assert_eq!(p.resource["value"], 1);
    assert_eq!(q.resource["value"], 2);
    assert_not_found!(store.read_item(&link, "a", &"R".into()).await, "third partition");
}

/// Creating an existing identity is a `Conflict` and leaves the item as is.
pub async fn items_duplicate_create_conflicts<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    store.create_item(&link, &"P".into(), item("a", "P", 1)).await.expect("create");

    assert_conflict!(store.create_item(&link, &"P".into(), item("a", "P", 2)).await);
    let read = store.read_item(&link, "a", &"P".into()).await.expect("read");
    assert_eq!(read.resource["value"], 1);
}

/// A body whose partition-key field disagrees with the addressed key is
/// rejected.
pub async fn items_create_rejects_partition_key_mismatch<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    assert_bad_request!(store.create_item(&link, &"P".into(), item("a", "Q", 1)).await);
    assert_bad_request!(store.create_item(&link, &"P".into(), json!({"partitionKey": "P"})).await);
    assert_not_found!(store.read_item(&link, "a", &"Q".into()).await, "rejected create");
}

/// Replacing a missing item is `NotFound`.
pub async fn items_replace_missing_is_not_found<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    let result = store.replace_item(&link, "a", &"P".into(), item("a", "P", 1), None).await;
    assert_not_found!(result);
}

/// A replace guarded by an outdated ETag fails with `PreconditionFailed`.
pub async fn items_replace_with_stale_etag_fails<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    let pk = PartitionKey::from("P");
    let created = store.create_item(&link, &pk, item("a", "P", 1)).await.expect("create");
    let stale = created.etag.expect("create etag");

    let replaced = store
        .replace_item(&link, "a", &pk, item("a", "P", 2), Some(&stale))
        .await
        .expect("guarded replace with current etag");
    assert_ne!(replaced.etag.as_deref(), Some(stale.as_str()), "replace must bump the etag");

    let result = store.replace_item(&link, "a", &pk, item("a", "P", 3), Some(&stale)).await;
    assert!(
        matches!(result, Err(StoreError::PreconditionFailed { .. })),
        "expected PreconditionFailed, got: {result:?}"
    );

    let read = store.read_item(&link, "a", &pk).await.expect("read");
    assert_eq!(read.resource["value"], 2);
}

/// A replace body with a different id or partition key is rejected.
pub async fn items_replace_rejects_identity_change<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    let pk = PartitionKey::from("P");
    store.create_item(&link, &pk, item("a", "P", 1)).await.expect("create");

    assert_bad_request!(store.replace_item(&link, "a", &pk, item("b", "P", 2), None).await);
    assert_bad_request!(store.replace_item(&link, "a", &pk, item("a", "Q", 2), None).await);
}

/// Deleting removes the item; deleting again is `NotFound`.
pub async fn items_delete_removes_item<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    let pk = PartitionKey::from("P");
    store.create_item(&link, &pk, item("a", "P", 1)).await.expect("create");

    let deleted = store.delete_item(&link, "a", &pk).await.expect("delete");
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_not_found!(store.read_item(&link, "a", &pk).await, "read after delete");
    assert_not_found!(store.delete_item(&link, "a", &pk).await, "second delete");
}

// ============================================================================
// Throughput: dedicated RU/s (2 tests)
// ============================================================================

/// Manual throughput reads back and can be raised.
pub async fn throughput_manual_read_then_replace<S: DocumentStore>(store: &S) {
    let spec = ContainerSpec::builder().id(TEST_CONTAINER).throughput(ThroughputSpec::Manual(400)).build();
    let link = provision(store, spec).await;

    let read = store.read_throughput(&link).await.expect("read throughput");
    assert_eq!(read.resource, Some(400));

    let replaced = store.replace_throughput(&link, 500).await.expect("replace throughput");
    assert_eq!(replaced.resource, 500);
    assert_eq!(store.read_throughput(&link).await.expect("reread").resource, Some(500));
}

/// Throughput below the minimum is rejected and leaves the old value.
pub async fn throughput_rejects_below_minimum<S: DocumentStore>(store: &S) {
    let spec = ContainerSpec::builder().id(TEST_CONTAINER).throughput(ThroughputSpec::Manual(400)).build();
    let link = provision(store, spec).await;

    assert_bad_request!(store.replace_throughput(&link, 100).await);
    assert_eq!(store.read_throughput(&link).await.expect("read").resource, Some(400));
}

// ============================================================================
// Query: paging, routing and syntax (3 tests)
// ============================================================================

/// Following continuations visits every match exactly once.
pub async fn query_pages_cover_every_match<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    for i in 0..7 {
        let pk = if i % 2 == 0 { "P" } else { "Q" };
        store
            .create_item(&link, &pk.into(), item(&format!("i{i}"), pk, i))
            .await
            .expect("create");
    }

    let mut request = QueryRequest {
        query: "SELECT * FROM c".to_owned(),
        max_item_count: Some(3),
        ..QueryRequest::default()
    };
    let mut seen = Vec::new();
    let mut pages = 0;
    loop {
        let page = store.query_items(&link, &request).await.expect("query page");
        assert!(page.resource.len() <= 3, "page exceeds max item count");
        seen.extend(page.resource.iter().filter_map(|doc| doc["id"].as_str().map(str::to_owned)));
        pages += 1;
        match page.continuation {
            Some(token) => request.continuation = Some(token),
            None => break,
        }
    }

    seen.sort();
    assert_eq!(seen, (0..7).map(|i| format!("i{i}")).collect::<Vec<_>>());
    assert!(pages >= 3, "seven items at three per page need at least three pages");
}

/// A routing hint or an equality on the partition-key field keeps the query
/// inside one partition.
pub async fn query_routing_stays_in_partition<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    store.create_item(&link, &"P".into(), item("a", "P", 1)).await.expect("create P");
    store.create_item(&link, &"Q".into(), item("b", "Q", 2)).await.expect("create Q");

    let hinted = QueryRequest {
        query: "SELECT * FROM c".to_owned(),
        partition_key: Some("P".into()),
        ..QueryRequest::default()
    };
    let page = store.query_items(&link, &hinted).await.expect("hinted query");
    assert_eq!(page.resource.len(), 1);
    assert_eq!(page.resource[0]["id"], "a");

    let filtered = QueryRequest {
        query: "SELECT * FROM c WHERE c.partitionKey = @pk".to_owned(),
        parameters: vec![QueryParameter { name: "@pk".to_owned(), value: json!("Q") }],
        ..QueryRequest::default()
    };
    let page = store.query_items(&link, &filtered).await.expect("filtered query");
    assert_eq!(page.resource.len(), 1);
    assert_eq!(page.resource[0]["id"], "b");
}

/// Malformed query text is a `BadRequest`.
pub async fn query_rejects_invalid_syntax<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    let request = QueryRequest { query: "SELEKT everything".to_owned(), ..QueryRequest::default() };
    assert_bad_request!(store.query_items(&link, &request).await);
}

// ============================================================================
// Lifecycle: charges and shutdown (2 tests)
// ============================================================================

/// Every successful response reports a positive request charge.
pub async fn lifecycle_responses_carry_request_charge<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    let pk = PartitionKey::from("P");

    let created = store.create_item(&link, &pk, item("a", "P", 1)).await.expect("create");
    let read = store.read_item(&link, "a", &pk).await.expect("read");
    let query = QueryRequest { query: "SELECT * FROM c".to_owned(), ..QueryRequest::default() };
    let queried = store.query_items(&link, &query).await.expect("query");

    for charge in [created.request_charge, read.request_charge, queried.request_charge] {
        assert!(charge > 0.0, "request charge should be positive, got {charge}");
    }
}

/// After shutdown every call fails with `Closed`, which is not transient;
/// shutting down again is fine.
pub async fn lifecycle_shutdown_is_final_and_idempotent<S: DocumentStore>(store: &S) {
    let link = items_container(store).await;
    store.shutdown().await.expect("shutdown");
    store.shutdown().await.expect("second shutdown");

    let result = store.read_item(&link, "a", &"P".into()).await;
    assert!(
        matches!(result, Err(StoreError::Closed)),
        "expected Closed after shutdown, got: {result:?}"
    );
    assert!(!result.unwrap_err().is_transient());
}
