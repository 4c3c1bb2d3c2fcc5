//! Error answers of the task API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Error returned by a task API handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The endpoint is routed but has no behavior yet.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        };
        tracing::debug!(error = %self, status = status.as_u16(), "request rejected");

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
