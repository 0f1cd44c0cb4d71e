//! Error types for the Mini Agent Platform gateway.

use thiserror::Error;

use crate::ratelimit::RateLimitError;

/// Main error type for platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tenant has used up its request quota for the current window
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded {
        retry_after: u64,
        limit: u32,
        window_seconds: u64,
    },

    /// A backing service (the rate limit store) cannot be reached
    #[error("Service unavailable ({reason}): {message}")]
    ServiceUnavailable { reason: String, message: String },

    /// The request failed validation
    #[error("Validation failed: {message}")]
    Validation {
        code: &'static str,
        message: String,
        details: serde_json::Value,
    },

    /// The requested resource does not exist for this tenant
    #[error("Not found: {message}")]
    NotFound { code: &'static str, message: String },

    /// Missing or unknown API key
    #[error("Authentication failed: {message}")]
    Authentication { code: &'static str, message: String },

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Machine-readable error code surfaced to API clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            PlatformError::Config(_) => "CONFIGURATION_ERROR",
            PlatformError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            PlatformError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            PlatformError::Validation { code, .. } => code,
            PlatformError::NotFound { code, .. } => code,
            PlatformError::Authentication { code, .. } => code,
            PlatformError::Internal(_) | PlatformError::Io(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn validation(message: impl Into<String>, details: serde_json::Value) -> Self {
        PlatformError::Validation {
            code: "VALIDATION_ERROR",
            message: message.into(),
            details,
        }
    }
}

impl From<RateLimitError> for PlatformError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Unavailable { reason, .. } => PlatformError::ServiceUnavailable {
                reason: reason.to_string(),
                message: "Rate limiting service temporarily unavailable".to_string(),
            },
            RateLimitError::InvalidConfig(msg) => PlatformError::Config(msg),
        }
    }
}

/// Result type alias for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
