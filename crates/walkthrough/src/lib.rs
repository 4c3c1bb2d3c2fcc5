//! Console walkthrough of the partitioned document store.
//!
//! Provisions a database and a container, scales the container, then
//! creates, queries, replaces and deletes household documents, logging the
//! request charge of every step. The walkthrough runs against the in-memory
//! emulator or, with credentials from the environment, the hosted service.
//!
//! ```
//! use docshard_store::{MemoryStore, Workspace};
//! use docshard_walkthrough::{WalkthroughConfig, run};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let config = WalkthroughConfig::builder().build().unwrap();
//! let report = run(Workspace::new(MemoryStore::new()), &config).await.unwrap();
//! assert_eq!(report.andersen.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]

pub mod config;
mod error;
pub mod household;
mod workflow;

pub use config::WalkthroughConfig;
pub use error::WalkthroughError;
pub use household::{Address, Child, Household, Parent, Pet};
pub use workflow::{ANDERSEN_QUERY, CreatedItem, Report, run};
