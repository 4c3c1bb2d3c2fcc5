//! Store error types and result alias.
//!
//! Every [`DocumentStore`](crate::DocumentStore) implementation maps its
//! service responses onto [`StoreError`]. The access-pattern layer relies on
//! this classification: expected conditions ([`StoreError::NotFound`], a
//! [`StoreError::BadRequest`] on throughput) become control flow, transient
//! ones ([`StoreError::is_transient`]) are retried, everything else
//! propagates to the caller unchanged.
//!
//! # Example
//!
//! ```
//! use docshard_store::{StoreError, StoreResult};
//!
//! fn lookup(id: &str) -> StoreResult<()> {
//!     Err(StoreError::not_found(id))
//! }
//!
//! assert!(matches!(lookup("Andersen.1"), Err(StoreError::NotFound { .. })));
//! ```

use std::{sync::Arc, time::Duration};

use http::StatusCode;
use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the document store.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The addressed database, container or item does not exist.
    ///
    /// For items this also covers an `id` that exists under a different
    /// partition key: identity is the (`id`, partition key) pair.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Link or identity of the missing resource.
        resource: String,
    },

    /// A resource with the same identity already exists.
    #[error("Resource already exists: {resource}")]
    Conflict {
        /// Link or identity of the conflicting resource.
        resource: String,
    },

    /// An `If-Match` precondition did not hold: the item changed since it
    /// was read.
    #[error("Precondition failed: {resource}")]
    PreconditionFailed {
        /// Link or identity of the item whose ETag no longer matched.
        resource: String,
    },

    /// The service rejected the request as malformed or unsupported.
    ///
    /// Reading throughput on a container without adjustable capacity
    /// surfaces as this variant.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Description returned by the service.
        message: String,
    },

    /// The request exceeded the provisioned throughput.
    #[error("Request rate is too large")]
    RateLimited {
        /// Delay the service asked the client to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// The request did not complete in time.
    #[error("Operation timeout")]
    Timeout,

    /// The service is temporarily unable to serve the request.
    #[error("Service unavailable: {message}")]
    Unavailable {
        /// Description returned by the service.
        message: String,
    },

    /// The credential was rejected.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description returned by the service.
        message: String,
    },

    /// Failure to reach the service.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// The store handle was released by
    /// [`shutdown`](crate::DocumentStore::shutdown); no further call can
    /// succeed.
    #[error("Store handle has been shut down")]
    Closed,

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying serializer error.
        #[source]
        source: Option<BoxError>,
    },

    /// A query iteration failed mid-way and cannot be resumed.
    #[error("Query iteration faulted; restart it from the beginning")]
    QueryFaulted,

    /// A read-modify-write cycle kept losing the ETag race.
    #[error("Precondition kept failing after {attempts} attempts")]
    RetriesExhausted {
        /// Total number of attempts made.
        attempts: u32,
    },

    /// Any other service or client failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl StoreError {
    /// Creates a new `NotFound` error for the given resource.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Creates a new `Conflict` error for the given resource.
    #[must_use]
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict { resource: resource.into() }
    }

    /// Creates a new `PreconditionFailed` error for the given resource.
    #[must_use]
    pub fn precondition_failed(resource: impl Into<String>) -> Self {
        Self::PreconditionFailed { resource: resource.into() }
    }

    /// Creates a new `BadRequest` error with the given message.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Creates a new `RateLimited` error.
    #[must_use]
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `Unavailable` error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    /// Creates a new `Unauthorized` error with the given message.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Closed` error.
    #[must_use]
    pub fn closed() -> Self {
        Self::Closed
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Maps a non-success service status onto the canonical variant.
    ///
    /// `resource` names what was addressed and `message` carries the
    /// service's own description. `retry_after` is only consulted for
    /// `429 Too Many Requests`.
    #[must_use]
    pub fn from_status(
        status: StatusCode,
        resource: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        let resource = resource.into();
        let message = message.into();
        match status {
            StatusCode::NOT_FOUND => Self::not_found(resource),
            StatusCode::CONFLICT => Self::conflict(resource),
            StatusCode::PRECONDITION_FAILED => Self::precondition_failed(resource),
            StatusCode::BAD_REQUEST => Self::bad_request(message),
            StatusCode::TOO_MANY_REQUESTS => Self::rate_limited(retry_after),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Self::timeout(),
            StatusCode::SERVICE_UNAVAILABLE => Self::unavailable(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::unauthorized(message),
            other => Self::internal(format!("service returned {other} for {resource}: {message}")),
        }
    }

    /// Returns the HTTP-style status this error corresponds to, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::Conflict { .. } => Some(StatusCode::CONFLICT),
            Self::PreconditionFailed { .. } => Some(StatusCode::PRECONDITION_FAILED),
            Self::BadRequest { .. } => Some(StatusCode::BAD_REQUEST),
            Self::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::Timeout => Some(StatusCode::REQUEST_TIMEOUT),
            Self::Unavailable { .. } => Some(StatusCode::SERVICE_UNAVAILABLE),
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    /// Returns `true` for faults that may succeed when retried unchanged.
    ///
    /// Rate limiting, timeouts, unavailability and connection failures are
    /// transient. `NotFound`, `Conflict`, `PreconditionFailed` and
    /// `BadRequest` describe the request itself, and `Closed` the handle;
    /// none of them is retried by [`with_retry`](crate::retry::with_retry).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Timeout
                | Self::Unavailable { .. }
                | Self::Connection { .. }
        )
    }

    /// Returns `true` when the service may already have applied the request.
    ///
    /// A timed-out or dropped request can still complete on the service, so
    /// a write that failed this way is ambiguous. A throttled or unavailable
    /// request was refused before it was applied.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection { .. })
    }

    /// Returns the service's retry hint for throttled requests.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_with_source(err.to_string(), err)
    }
}

/// Invalid configuration, reported before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required setting was not supplied.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// A setting was supplied but is not acceptable.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Name of the offending setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_expected_conditions() {
        let err = StoreError::from_status(StatusCode::NOT_FOUND, "docs/a", "missing", None);
        assert!(matches!(err, StoreError::NotFound { ref resource } if resource == "docs/a"));

        let err = StoreError::from_status(StatusCode::BAD_REQUEST, "offers", "no offer", None);
        assert!(matches!(err, StoreError::BadRequest { ref message } if message == "no offer"));

        let err = StoreError::from_status(StatusCode::CONFLICT, "docs/a", "exists", None);
        assert!(matches!(err, StoreError::Conflict { .. }));

        let err = StoreError::from_status(StatusCode::PRECONDITION_FAILED, "docs/a", "etag", None);
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
    }

    #[test]
    fn test_from_status_keeps_retry_hint() {
        let hint = Duration::from_millis(250);
        let err = StoreError::from_status(StatusCode::TOO_MANY_REQUESTS, "docs", "", Some(hint));
        assert_eq!(err.retry_after(), Some(hint));
        assert!(err.is_transient());
    }

    #[test]
    fn test_unknown_status_is_internal() {
        let err =
            StoreError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "docs/a", "boom", None);
        assert!(matches!(err, StoreError::Internal { .. }));
        assert!(err.status().is_none());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::timeout().is_transient());
        assert!(StoreError::unavailable("busy").is_transient());
        assert!(StoreError::connection("reset").is_transient());
        assert!(!StoreError::not_found("x").is_transient());
        assert!(!StoreError::bad_request("x").is_transient());
        assert!(!StoreError::precondition_failed("x").is_transient());
        assert!(!StoreError::QueryFaulted.is_transient());
        assert!(!StoreError::closed().is_transient());
    }

    #[test]
    fn test_ambiguous_classification() {
        assert!(StoreError::timeout().is_ambiguous());
        assert!(StoreError::connection("reset").is_ambiguous());
        assert!(!StoreError::rate_limited(None).is_ambiguous());
        assert!(!StoreError::unavailable("busy").is_ambiguous());
        assert!(!StoreError::closed().is_ambiguous());
    }

    #[test]
    fn test_status_roundtrips_through_from_status() {
        for err in [
            StoreError::not_found("r"),
            StoreError::conflict("r"),
            StoreError::precondition_failed("r"),
            StoreError::bad_request("m"),
            StoreError::unavailable("m"),
            StoreError::unauthorized("m"),
        ] {
            let status = err.status().expect("classified errors carry a status");
            let mapped = StoreError::from_status(status, "r", "m", None);
            assert_eq!(mapped.status(), Some(status));
        }
    }

    #[test]
    fn test_serde_json_error_becomes_serialization() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization { source: Some(_), .. }));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(StoreError::not_found("docs/x").to_string(), "Resource not found: docs/x");
        assert_eq!(
            ConfigError::invalid("max_retries", "too large").to_string(),
            "invalid value for `max_retries`: too large"
        );
        assert_eq!(ConfigError::Missing("endpoint").to_string(), "missing required setting `endpoint`");
    }
}
