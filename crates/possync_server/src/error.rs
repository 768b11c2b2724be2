//! Error types for the terminal-facing server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use possync_engine::SyncError;
use possync_protocol::ValidationError;
use possync_staging::StagingError;
use serde_json::json;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving a terminal request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The submission failed canonical validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with work already in progress.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A forwarded upstream call failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] SyncError),

    /// The staging store failed.
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    ///
    /// Upstream failures are 503 when the upstream could not be reached and
    /// 502 when it answered with an error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Upstream(SyncError::Transport { .. } | SyncError::Timeout) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Staging(_) | ServerError::Internal(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    fn label(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "Invalid request",
            ServerError::Validation(_) => "Invalid transaction data",
            ServerError::NotFound(_) => "Not found",
            ServerError::Conflict(_) => "Conflict",
            ServerError::Upstream(_) => "Upstream request failed",
            ServerError::Staging(_) => "Failed to stage transaction",
            ServerError::Internal(_) | ServerError::Io(_) => "Internal server error",
        }
    }

    fn details(&self) -> String {
        match self {
            ServerError::InvalidRequest(msg)
            | ServerError::NotFound(msg)
            | ServerError::Conflict(msg)
            | ServerError::Internal(msg) => msg.clone(),
            ServerError::Validation(e) => e.to_string(),
            ServerError::Upstream(e) => e.to_string(),
            ServerError::Staging(e) => e.to_string(),
            ServerError::Io(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = json!({
            "error": self.label(),
            "details": self.details(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Validation(ValidationError::EmptyRecords).is_client_error());
        assert!(ServerError::Conflict("busy".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn upstream_status_mapping() {
        let unreachable = ServerError::from(SyncError::transport_retryable("refused"));
        assert_eq!(unreachable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout = ServerError::from(SyncError::Timeout);
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let rejected = ServerError::from(SyncError::upstream(404, "no such transaction"));
        assert_eq!(rejected.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn details_name_the_field() {
        let err = ServerError::from(ValidationError::missing("transactionSummary.store"));
        assert_eq!(err.label(), "Invalid transaction data");
        assert!(err.details().contains("transactionSummary.store"));
    }
}
