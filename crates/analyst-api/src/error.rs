//! API error types and JSON error response formatting.
//!
//! ApiError gives every endpoint the same `{error, message}` body and maps
//! the lower crates' errors onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use analyst_chat::ChatError;
use analyst_core::error::AnalystError;
use analyst_export::ExportError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - the resource is not in a state that allows the request.
    Conflict(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 503 Service Unavailable - no language model configured.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
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

impl From<AnalystError> for ApiError {
    fn from(err: AnalystError) -> Self {
        match &err {
            AnalystError::SessionNotFound(id) => {
                ApiError::NotFound(format!("Session not found: {}", id))
            }
            AnalystError::Config(msg) => ApiError::BadRequest(msg.clone()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::SessionNotFound(id) => ApiError::NotFound(format!("Session not found: {}", id)),
            ChatError::BrdNotGenerated => ApiError::NotFound(err.to_string()),
            ChatError::ServiceUnavailable => ApiError::ServiceUnavailable(err.to_string()),
            ChatError::InvalidTransition(..) => ApiError::Conflict(err.to_string()),
            ChatError::Llm(msg) => ApiError::Internal(format!("LLM error: {}", msg)),
            ChatError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::UnknownFormat(_) => ApiError::BadRequest(err.to_string()),
            ExportError::EmptyDocument => ApiError::NotFound(ChatError::BrdNotGenerated.to_string()),
        }
    }
}
