//! API error types and JSON error response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use clarify_core::error::ClarifyError;
use clarify_dialog::DialogError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - unknown session.
    NotFound(String),
    /// 500 Internal Server Error.
    Internal(String),
    /// 503 Service Unavailable - a collaborator is not ready.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ClarifyError> for ApiError {
    fn from(err: ClarifyError) -> Self {
        match err {
            ClarifyError::Config(msg) => ApiError::BadRequest(msg),
            ClarifyError::Backend(msg) => ApiError::ServiceUnavailable(msg),
            ClarifyError::ShuttingDown => ApiError::ServiceUnavailable("shutting down".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DialogError> for ApiError {
    fn from(err: DialogError) -> Self {
        ApiError::from(ClarifyError::from(err))
    }
}
