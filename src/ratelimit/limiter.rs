//! Tenant-facing rate limiter.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::backend::{RateLimitBackend, RateLimitError, RateLimitResult};
use super::key::RateLimitKey;
use crate::config::RateLimitConfig;

/// Binds a backend to the process-wide `(limit, window)` pair and partitions
/// requests by tenant.
///
/// This struct is thread-safe and can be shared across multiple tasks.
/// Admission is decided solely by [`check_and_consume`]; the peek methods
/// exist only to annotate responses.
///
/// [`check_and_consume`]: RateLimiter::check_and_consume
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
    /// Requests admitted per window
    limit: u32,
    /// Window length in seconds
    window_seconds: u64,
}

impl RateLimiter {
    /// Create a rate limiter. A zero limit or window is a configuration error.
    pub fn new(
        backend: Arc<dyn RateLimitBackend>,
        limit: u32,
        window_seconds: u64,
    ) -> Result<Self, RateLimitError> {
        if limit == 0 {
            return Err(RateLimitError::InvalidConfig(
                "limit must be greater than zero".to_string(),
            ));
        }
        if window_seconds == 0 {
            return Err(RateLimitError::InvalidConfig(
                "window_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            backend,
            limit,
            window_seconds,
        })
    }

    /// Create a rate limiter from the rate limit configuration section.
    pub fn from_config(
        backend: Arc<dyn RateLimitBackend>,
        config: &RateLimitConfig,
    ) -> Result<Self, RateLimitError> {
        Self::new(backend, config.requests, config.window_seconds)
    }

    /// Check the tenant's window and record the request if it is admitted.
    pub async fn check_and_consume(&self, tenant_id: &Uuid) -> Result<RateLimitResult, RateLimitError> {
        // Tenants never share a window
        let key = RateLimitKey::for_tenant(tenant_id);

        let result = self
            .backend
            .check_and_consume(key.as_str(), self.limit, self.window_seconds)
            .await?;

        if result.allowed {
            debug!(
                tenant_id = %tenant_id,
                remaining = result.remaining,
                "Request admitted"
            );
        } else {
            warn!(
                tenant_id = %tenant_id,
                retry_after = result.retry_after,
                "Rate limit exceeded"
            );
        }

        Ok(result)
    }

    /// Requests the tenant could still make in the current window.
    pub async fn get_remaining(&self, tenant_id: &Uuid) -> Result<u32, RateLimitError> {
        let key = RateLimitKey::for_tenant(tenant_id);
        self.backend
            .get_remaining(key.as_str(), self.limit, self.window_seconds)
            .await
    }

    /// Like [`get_remaining`](RateLimiter::get_remaining), but reports 0 when
    /// the backend fails. Only for non-authoritative annotation.
    pub async fn remaining_or_zero(&self, tenant_id: &Uuid) -> u32 {
        match self.get_remaining(tenant_id).await {
            Ok(remaining) => remaining,
            // Never fail the caller over an informational read
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Could not read remaining quota");
                0
            }
        }
    }

    /// Release the backend's resources.
    pub async fn close(&self) {
        self.backend.close().await;
    }

    /// Configured requests per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Configured window length in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }
}
