//! Task list scaffold.
//!
//! An HTTP surface for a task list front-end. The list endpoint serves an
//! in-memory list holding one seed task; the single-item, create, update and
//! delete endpoints are routed but answer `501 Not Implemented`.

#![deny(unsafe_code)]

mod error;
pub mod model;
pub mod routes;

pub use error::ApiError;
pub use model::Todo;
pub use routes::{AppState, router};

/// Environment variable naming the listen address.
pub const ADDR_VAR: &str = "DOCSHARD_TODO_ADDR";

/// Listen address used when [`ADDR_VAR`] is unset.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
