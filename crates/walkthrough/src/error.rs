//! Errors the walkthrough reports before exiting.

use docshard_store::{ConfigError, StoreError};
use docshard_store_rest::RestStoreError;
use http::StatusCode;
use thiserror::Error;

/// Failure of a walkthrough run.
#[derive(Debug, Error)]
pub enum WalkthroughError {
    /// A required environment variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// A configuration value was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The REST client could not be set up.
    #[error("REST client error: {0}")]
    Rest(#[from] RestStoreError),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WalkthroughError {
    /// Returns the service status of a failed store operation.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Store(err) => err.status(),
            _ => None,
        }
    }
}
