//! Partitioned document store abstraction and access patterns.
//!
//! This crate provides the [`DocumentStore`] trait, an in-memory emulator of
//! a partitioned JSON document service and the access layer that applications
//! build on: idempotent provisioning, existence-checked creates, partitioned
//! point reads, paged queries and read-modify-write replaces.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │          (walkthrough binary, todo HTTP service)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     Access Layer                            │
//! │  Workspace → DatabaseHandle → ContainerHandle               │
//! │  (provision, create_if_absent, read, query, replace)        │
//! │        retry with backoff │ request-charge meter            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   docshard-store                            │
//! │                 DocumentStore trait                         │
//! │   (databases, containers, throughput, items, queries)       │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryStore  │            RestStore                         │
//! │  (emulator)  │   (in `docshard-store-rest`, HTTPS service)  │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use docshard_store::{ContainerSpec, MemoryStore, Workspace};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Note {
//!     id: String,
//!     #[serde(rename = "partitionKey")]
//!     owner: String,
//!     text: String,
//! }
//!
//! impl docshard_store::Document for Note {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn partition_key(&self) -> docshard_store::PartitionKey {
//!         self.owner.as_str().into()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workspace = Workspace::new(MemoryStore::new());
//!     let notes = workspace
//!         .ensure_database("Notes")
//!         .await?
//!         .ensure_container(&ContainerSpec::builder().id("ByOwner").build())
//!         .await?;
//!
//!     let note = Note { id: "n1".into(), owner: "ada".into(), text: "hello".into() };
//!     assert!(notes.create_if_absent(&note).await?.created);
//!     assert!(!notes.create_if_absent(&note).await?.created);
//!
//!     let read = notes.read_item::<Note>("n1", &"ada".into()).await?;
//!     assert_eq!(read.resource.text, "hello");
//!
//!     workspace.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Available Stores
//!
//! | Store | Use Case | Persistence |
//! |-------|----------|-------------|
//! | [`MemoryStore`] | Testing, local runs | No |
//! | `RestStore` (in `docshard-store-rest`) | Hosted service | Yes |
//!
//! # Error Handling
//!
//! All operations return [`StoreResult<T>`]. Service answers map onto
//! [`StoreError`] by status code, so callers branch on `NotFound`,
//! `Conflict` or `PreconditionFailed` the same way whichever store is
//! behind the workspace. Throttling and transient faults are retried by the
//! access layer (see [`retry`]) before they surface.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (fixture document, provisioned-container helper,
//!   assertion macros) and the [`conformance`] suite. Enable this in `[dev-dependencies]` for
//!   integration tests.

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod conformance;
pub mod document;
pub mod error;
mod filter;
pub mod memory;
mod mutator;
pub mod provision;
pub mod reader;
pub mod retry;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;
pub mod workspace;
mod writer;

// Re-export primary types at crate root for convenience
pub use backend::DocumentStore;
pub use document::{CreateOutcome, Document, Lookup};
pub use error::{BoxError, ConfigError, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use provision::ThroughputChange;
pub use reader::{Page, QueryPager, QuerySpec};
pub use retry::{EtagRetryConfig, RetryConfig};
pub use types::{
    ContainerLink, ContainerProperties, ContainerSpec, DEFAULT_PARTITION_KEY_PATH,
    DatabaseProperties, MIN_THROUGHPUT, PartitionKey, PartitionKeyPath, QueryParameter,
    QueryRequest, Response, ThroughputSpec,
};
pub use workspace::{ContainerHandle, DatabaseHandle, Teardown, Workspace};
