//! REST backend for the docshard document store.
//!
//! [`RestStore`] implements [`DocumentStore`](docshard_store::DocumentStore)
//! against the hosted service's REST API, so everything built on the store
//! crate's access layer runs unchanged against a live account.
//!
//! # Protocol Mapping
//!
//! | Operation                        | Request                                         |
//! |----------------------------------|-------------------------------------------------|
//! | `create_database_if_not_exists`  | `POST dbs`, then `GET dbs/{db}` on 409          |
//! | `delete_database`                | `DELETE dbs/{db}`                               |
//! | `create_container_if_not_exists` | `POST dbs/{db}/colls`, then `GET` on 409        |
//! | `read_throughput`                | `GET` the container, `POST offers` query by rid |
//! | `replace_throughput`             | as above, then `PUT offers/{offer}`             |
//! | `read_item` / `delete_item`      | `GET` / `DELETE dbs/{db}/colls/{c}/docs/{id}`   |
//! | `create_item`                    | `POST dbs/{db}/colls/{c}/docs`                  |
//! | `replace_item`                   | `PUT .../docs/{id}`, `If-Match` when checked    |
//! | `query_items`                    | `POST .../docs` with `x-ms-documentdb-isquery`  |
//!
//! Every request carries `x-ms-date`, `x-ms-version` and a master-key
//! `authorization` token (see [`auth`]). Error statuses map onto
//! [`StoreError`](docshard_store::StoreError) by code; a 429 carries the
//! service's `x-ms-retry-after-ms` delay.
//!
//! # Example
//!
//! ```no_run
//! use docshard_store::Workspace;
//! use docshard_store_rest::{RestStore, RestStoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RestStoreConfig::builder()
//!     .endpoint("https://my-account.documents.example.com:443/")
//!     .master_key(std::env::var("DOCSHARD_KEY")?)
//!     .build()?;
//!
//! let workspace = Workspace::new(RestStore::new(config)?);
//! let database = workspace.ensure_database("ToDoList").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! The `testutil` feature adds an in-process fake of the service, backed by
//! the in-memory emulator, that verifies request signatures.

#![deny(unsafe_code)]

pub mod auth;
mod backend;
mod config;
mod error;
pub mod headers;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
mod wire;

pub use backend::RestStore;
pub use config::{DEFAULT_API_VERSION, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT, RestStoreConfig};
pub use docshard_store::ConfigError;
pub use error::{RestStoreError, Result};
