//! Error types for the REST store.
//!
//! [`RestStoreError`] covers failures that happen on the client side of the
//! wire: configuration, transport, request signing and undecodable answers.
//! Service answers with an error status never become a `RestStoreError`; they
//! map straight onto [`StoreError`] by status code.

use docshard_store::{ConfigError, StoreError};
use thiserror::Error;

/// Result type alias for REST store setup and request plumbing.
pub type Result<T> = std::result::Result<T, RestStoreError>;

/// Errors specific to the REST store.
#[derive(Debug, Error)]
pub enum RestStoreError {
    /// The configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client failed to send the request or read the answer.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request could not be signed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The service answered with a success status but an unexpected body.
    #[error("Unexpected response: {0}")]
    Protocol(String),
}

impl From<RestStoreError> for StoreError {
    fn from(err: RestStoreError) -> Self {
        match err {
            RestStoreError::Config(source) => {
                StoreError::internal_with_source(format!("Config: {source}"), source)
            },
            RestStoreError::Transport(source) if source.is_timeout() => {
                tracing::warn!(error = %source, "request timed out");
                StoreError::timeout()
            },
            RestStoreError::Transport(source) if source.is_decode() => {
                StoreError::serialization_with_source("response body did not decode", source)
            },
            RestStoreError::Transport(source) => {
                StoreError::connection_with_source(source.to_string(), source)
            },
            RestStoreError::Signing(message) => StoreError::internal(format!("Signing: {message}")),
            RestStoreError::Protocol(message) => StoreError::serialization(message),
        }
    }
}
