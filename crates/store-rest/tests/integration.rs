//! End-to-end tests of `RestStore` against the in-process fake service.

#![allow(clippy::expect_used, clippy::panic)]

use std::time::Duration;

use docshard_store::{
    ContainerSpec, DocumentStore, Lookup, QuerySpec, StoreError, Teardown, ThroughputSpec, Workspace,
    testutil::{TestDoc, fast_retry},
};
use docshard_store_rest::{
    RestStore, RestStoreConfig,
    testutil::{FakeService, create_test_store},
};

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn wrong_master_key_is_unauthorized() {
    let service = FakeService::start().await;
    let config = RestStoreConfig::builder()
        .endpoint(service.endpoint())
        .master_key("b3RoZXIta2V5LW5vdC1yZWdpc3RlcmVk")
        .build()
        .expect("valid config");
    let store = RestStore::new(config).expect("store");

    let result = store.create_database_if_not_exists("db").await;
    assert!(matches!(result, Err(StoreError::Unauthorized { .. })), "got: {result:?}");
    assert!(service.store().read_database("db").is_err(), "rejected request must not reach the store");
}

#[tokio::test]
async fn item_ids_with_reserved_characters_are_signed_and_routed() {
    let service = FakeService::start().await;
    let store = create_test_store(&service);
    let workspace = Workspace::new(store);
    let items = workspace
        .ensure_database("db")
        .await
        .expect("database")
        .ensure_container(&ContainerSpec::builder().id("items").build())
        .await
        .expect("container");

    let doc = TestDoc::new("Wakefield 7/b", "Wakefield", "v1");
    let outcome = items.create_if_absent(&doc).await.expect("create");
    assert!(outcome.created);

    let read = items.read_item::<TestDoc>("Wakefield 7/b", &"Wakefield".into()).await.expect("read");
    assert_eq!(read.resource, doc);
}

// ============================================================================
// Throttling
// ============================================================================

#[tokio::test]
async fn throttled_call_surfaces_retry_after() {
    let service = FakeService::start().await;
    let store = create_test_store(&service);
    service.store().throttle_next(1, Some(Duration::from_millis(250)));

    let result = store.create_database_if_not_exists("db").await;
    match result {
        Err(StoreError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_millis(250)));
        },
        other => panic!("expected RateLimited, got: {other:?}"),
    }
}

#[tokio::test]
async fn workspace_retries_throttled_calls() {
    let service = FakeService::start().await;
    let workspace = Workspace::new(create_test_store(&service)).with_retry_config(fast_retry());
    service.store().throttle_next(2, Some(Duration::from_millis(1)));

    let database = workspace.ensure_database("db").await.expect("retried until admitted");
    assert_eq!(database.id(), "db");
    assert!(service.store().read_database("db").is_ok());
}

// ============================================================================
// Access patterns
// ============================================================================

#[tokio::test]
async fn access_patterns_run_over_rest() {
    let service = FakeService::start().await;
    let workspace = Workspace::new(create_test_store(&service)).with_retry_config(fast_retry());

    let total = workspace
        .scoped(Teardown::DeleteDatabase("db".into()), |ws| async move {
            let items = ws
                .ensure_database("db")
                .await?
                .ensure_container(
                    &ContainerSpec::builder().id("items").throughput(ThroughputSpec::Manual(400)).build(),
                )
                .await?;

            let first = items.create_if_absent(&TestDoc::new("a", "P", "one")).await?;
            assert!(first.created);
            let again = items.create_if_absent(&TestDoc::new("a", "P", "changed")).await?;
            assert!(!again.created);
            assert_eq!(again.resource.value, "one");

            for id in ["b", "c", "d"] {
                items.create_if_absent(&TestDoc::new(id, "P", "x")).await?;
            }
            items.create_if_absent(&TestDoc::new("z", "Q", "x")).await?;

            let replaced = items
                .replace_checked::<TestDoc, _>("a", &"P".into(), |doc| doc.value = "two".into())
                .await?;
            assert_eq!(replaced.resource.value, "two");

            let found: Vec<TestDoc> = items
                .query(QuerySpec::new("SELECT * FROM c").within_partition("P").with_max_item_count(2))
                .try_collect_all()
                .await?;
            assert_eq!(found.len(), 4);
            assert!(found.iter().all(|doc| doc.partition_key == "P"));

            let change = items.increase_throughput(100).await?.expect("manual throughput");
            assert_eq!((change.previous, change.current), (400, 500));

            items.delete_item("z", &"Q".into()).await?;
            let gone = items.read_if_exists::<TestDoc>("z", &"Q".into()).await?;
            assert!(matches!(gone, Lookup::Absent));

            Ok::<_, StoreError>(ws.total_request_charge())
        })
        .await
        .expect("workflow");

    assert!(total > 0.0);
    assert!(service.store().read_database("db").is_err(), "teardown deletes the database");
    assert!(!service.store().is_closed(), "closing the client leaves the service running");
}

#[tokio::test]
async fn shared_throughput_container_has_no_offer() {
    let service = FakeService::start().await;
    let workspace = Workspace::new(create_test_store(&service));
    let items = workspace
        .ensure_database("db")
        .await
        .expect("database")
        .ensure_container(&ContainerSpec::builder().id("items").throughput(ThroughputSpec::Shared).build())
        .await
        .expect("container");

    assert_eq!(items.read_throughput().await.expect("read"), None);
    assert_eq!(items.increase_throughput(100).await.expect("skip"), None);
}
