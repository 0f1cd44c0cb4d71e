//! Backend trait for abstracting in-process and distributed request windows.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Outcome of a single check-and-consume call.
///
/// A denial is an ordinary value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Whether the request was admitted and recorded
    pub allowed: bool,
    /// Requests still admissible in the current window
    pub remaining: u32,
    /// Seconds to wait before retrying; 0 when allowed
    pub retry_after: u64,
}

impl RateLimitResult {
    /// An admitted request.
    pub fn admitted(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: 0,
        }
    }

    /// A denied request. `retry_after` is clamped to at least one second.
    pub fn denied(retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: retry_after.max(1),
        }
    }
}

/// Errors raised by rate limit backends.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The store could not be reached or failed while evaluating the window.
    #[error("rate limit backend unavailable ({reason}): {message}")]
    Unavailable {
        reason: &'static str,
        message: String,
    },
    /// Limit, window or connection settings are unusable.
    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

impl RateLimitError {
    pub fn unavailable(reason: &'static str, message: impl Into<String>) -> Self {
        RateLimitError::Unavailable {
            reason,
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RateLimitError::Unavailable { .. })
    }
}

/// Trait for sliding-window storage backends.
///
/// Implementations must evaluate `check_and_consume` atomically per key:
/// concurrent callers on the same key observe some serial order of
/// prune, count and conditional insert.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Prune expired records, count the rest and admit the request if the
    /// count is below `limit`.
    async fn check_and_consume(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<RateLimitResult, RateLimitError>;

    /// Report how many requests the window would still admit, without
    /// recording anything.
    async fn get_remaining(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<u32, RateLimitError>;

    /// Release held connections or state. Safe to call more than once.
    async fn close(&self);
}
