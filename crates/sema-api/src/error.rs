//! API error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use sema_lsp::SemaLspError;

/// Errors surfaced over the HTTP boundary
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed caller input; never retried
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// No backend can serve the request right now
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A backend call exceeded its deadline
    #[error("backend timeout: {0}")]
    Timeout(String),

    /// Anything else; the process keeps running
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SemaLspError> for ApiError {
    fn from(error: SemaLspError) -> Self {
        match error {
            SemaLspError::InvalidRequest(message) => ApiError::BadRequest(message),
            SemaLspError::NoActiveBackend { .. }
            | SemaLspError::DependencyMissing { .. }
            | SemaLspError::ReconnectExhausted { .. }
            | SemaLspError::LaunchFailure { .. } => ApiError::Unavailable(error.to_string()),
            SemaLspError::RequestTimeout { .. } | SemaLspError::HandshakeTimeout { .. } => {
                ApiError::Timeout(error.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;
