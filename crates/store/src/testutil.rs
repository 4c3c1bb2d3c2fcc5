//! Shared test utilities for document store testing.
//!
//! This module provides a small typed fixture, helpers that hand out a
//! provisioned container, and assertion macros on [`StoreResult`] values.
//! It is feature-gated behind `testutil` to keep it out of production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! docshard-store = { path = "../store", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use docshard_store::testutil::{TestDoc, provisioned_container};
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    backend::DocumentStore,
    document::Document,
    error::StoreResult,
    memory::MemoryStore,
    retry::RetryConfig,
    types::{ContainerLink, ContainerSpec, PartitionKey},
    workspace::{ContainerHandle, Workspace},
};

/// Database the helpers provision.
pub const TEST_DATABASE: &str = "db";

/// Container the helpers provision.
pub const TEST_CONTAINER: &str = "items";

/// Minimal document partitioned by `/partitionKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDoc {
    /// Document id.
    pub id: String,
    /// Partition-key value.
    #[serde(rename = "partitionKey")]
    pub partition_key: String,
    /// Payload.
    pub value: String,
}

impl TestDoc {
    /// Creates a document.
    #[must_use]
    pub fn new(id: &str, partition_key: &str, value: &str) -> Self {
        Self { id: id.to_owned(), partition_key: partition_key.to_owned(), value: value.to_owned() }
    }
}

impl Document for TestDoc {
    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.partition_key.clone())
    }
}

/// Retry policy with millisecond backoffs, so throttling tests stay fast.
#[must_use]
pub fn fast_retry() -> RetryConfig {
    RetryConfig { max_retries: 3, initial_backoff: Duration::from_millis(1), max_backoff: Duration::from_millis(10) }
}

/// Creates [`TEST_DATABASE`] and [`TEST_CONTAINER`] directly on `store`.
///
/// # Panics
///
/// Panics if the store refuses either creation.
pub async fn provision<S: DocumentStore>(store: &S, spec: ContainerSpec) -> ContainerLink {
    store.create_database_if_not_exists(TEST_DATABASE).await.expect("create database");
    store.create_container_if_not_exists(TEST_DATABASE, &spec).await.expect("create container");
    ContainerLink::new(TEST_DATABASE, spec.id)
}

/// Returns a fresh [`MemoryStore`] and a handle to a provisioned container
/// using [`fast_retry`].
///
/// # Panics
///
/// Panics if provisioning fails (should not happen with `MemoryStore`).
pub async fn provisioned_container() -> (MemoryStore, ContainerHandle<MemoryStore>) {
    let store = MemoryStore::new();
    let workspace = Workspace::new(store.clone()).with_retry_config(fast_retry());
    let items = workspace
        .ensure_database(TEST_DATABASE)
        .await
        .expect("ensure database")
        .ensure_container(&ContainerSpec::builder().id(TEST_CONTAINER).build())
        .await
        .expect("ensure container");
    (store, items)
}

/// Assert that a [`StoreResult`] is a [`StoreError::Conflict`](crate::StoreError::Conflict).
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use docshard_store::{StoreError, StoreResult, assert_conflict};
///
/// let result: StoreResult<()> = Err(StoreError::conflict("docs/a"));
/// assert_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StoreError::Conflict { .. })),
            "expected StoreError::Conflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StoreError::Conflict { .. })),
            "{}: expected StoreError::Conflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StoreResult`] is a [`StoreError::NotFound`](crate::StoreError::NotFound).
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use docshard_store::{StoreError, StoreResult, assert_not_found};
///
/// let result: StoreResult<()> = Err(StoreError::not_found("docs/a"));
/// assert_not_found!(result);
/// ```
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StoreError::NotFound { .. })),
            "expected StoreError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StoreError::NotFound { .. })),
            "{}: expected StoreError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StoreResult`] is a [`StoreError::BadRequest`](crate::StoreError::BadRequest).
#[macro_export]
macro_rules! assert_bad_request {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StoreError::BadRequest { .. })),
            "expected StoreError::BadRequest, got: {:?}",
            $result,
        );
    };
}

/// Returns `true` if `result` is a `NotFound` error.
pub fn is_not_found<T>(result: &StoreResult<T>) -> bool {
    matches!(result, Err(crate::error::StoreError::NotFound { .. }))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_doc_wire_names() {
        let json = serde_json::to_value(TestDoc::new("a", "P", "v")).expect("serialize");
        assert_eq!(json, serde_json::json!({"id": "a", "partitionKey": "P", "value": "v"}));
    }

    #[tokio::test]
    async fn test_provisioned_container() {
        let (store, items) = provisioned_container().await;
        assert_eq!(items.link(), &ContainerLink::new(TEST_DATABASE, TEST_CONTAINER));
        assert_eq!(store.request_count(), 2);
    }

    #[test]
    fn test_assertion_macros() {
        let result: StoreResult<()> = Err(StoreError::conflict("x"));
        assert_conflict!(result);

        let result: StoreResult<()> = Err(StoreError::not_found("x"));
        assert_not_found!(result, "missing item");
        assert!(is_not_found(&result));

        let result: StoreResult<()> = Err(StoreError::bad_request("x"));
        assert_bad_request!(result);
    }
}
