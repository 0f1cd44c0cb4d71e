//! Mapping of platform errors onto HTTP responses.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::error::PlatformError;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: String,
    pub message: String,
    pub details: Value,
}

impl PlatformError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PlatformError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            PlatformError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PlatformError::Validation { .. } => StatusCode::BAD_REQUEST,
            PlatformError::NotFound { .. } => StatusCode::NOT_FOUND,
            PlatformError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            PlatformError::Config(_) | PlatformError::Internal(_) | PlatformError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code().to_string();

        if status.is_server_error() {
            error!(error_code = %error_code, error = %self, "Request failed");
        } else {
            warn!(error_code = %error_code, error = %self, "Request rejected");
        }

        let mut retry_after = None;
        let (message, details) = match self {
            PlatformError::RateLimitExceeded {
                retry_after: seconds,
                limit,
                window_seconds,
            } => {
                retry_after = Some(seconds);
                (
                    format!("Rate limit exceeded. Try again in {} seconds.", seconds),
                    json!({
                        "limit": limit,
                        "window_seconds": window_seconds,
                        "retry_after_seconds": seconds,
                    }),
                )
            }
            PlatformError::ServiceUnavailable { reason, message } => {
                (message, json!({ "reason": reason }))
            }
            PlatformError::Validation { message, details, .. } => (message, details),
            PlatformError::NotFound { message, .. } => (message, Value::Null),
            PlatformError::Authentication { message, .. } => (message, Value::Null),
            // Internal detail stays in the log.
            PlatformError::Config(_) | PlatformError::Internal(_) | PlatformError::Io(_) => (
                "An unexpected error occurred".to_string(),
                Value::Null,
            ),
        };

        let body = ErrorBody {
            error_code,
            message,
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
