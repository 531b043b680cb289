//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request
//! tracking. Core errors map onto the envelope here; internal causes are
//! logged but never leaked to clients.

use crate::errors::CoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (UNAUTHORIZED, CONFLICT, RATE_LIMITED, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (can be any JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: CoreError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(request_id: String, kind: CoreError) -> Self {
        Self { kind, request_id }
    }

    pub fn bad_request(request_id: String, message: impl Into<String>) -> Self {
        Self::new(request_id, CoreError::Validation(message.into()))
    }

    pub fn unauthorized(request_id: String, message: impl Into<String>) -> Self {
        Self::new(request_id, CoreError::Unauthenticated(message.into()))
    }

    pub fn not_found(request_id: String, message: impl Into<String>) -> Self {
        Self::new(request_id, CoreError::NotFound(message.into()))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.request_id, self.kind)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self.kind {
            CoreError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None)
            }
            CoreError::Unauthenticated(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None)
            }
            CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            CoreError::Conflict { message, details } => {
                (StatusCode::CONFLICT, "CONFLICT", message, details)
            }
            CoreError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "too many requests, slow down".to_string(),
                None,
            ),
            CoreError::Upstream(msg) => {
                error!(request_id = %self.request_id, cause = %msg, "upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "upstream service unavailable".to_string(),
                    None,
                )
            }
            CoreError::Internal(msg) => {
                error!(request_id = %self.request_id, cause = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(kind: CoreError) -> StatusCode {
        ApiError::new("req-1".to_string(), kind)
            .into_response()
            .status()
    }

    #[test]
    fn test_core_errors_map_to_status_codes() {
        assert_eq!(
            status_of(CoreError::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CoreError::Unauthenticated("no".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(CoreError::Forbidden("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CoreError::NotFound("gone".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(CoreError::conflict("dup")), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CoreError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(CoreError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_message_not_leaked() {
        let response = ApiError::new(
            "req-1".to_string(),
            CoreError::Internal("secret detail".into()),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Body assembly happens before the response is sent; the generic
        // message is fixed above and the cause only reaches the log.
    }
}
