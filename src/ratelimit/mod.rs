//! Sliding-window rate limiting and its storage backends.

mod backend;
mod distributed;
mod key;
mod limiter;
mod memory;
mod window;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use backend::{RateLimitBackend, RateLimitError, RateLimitResult};
pub use distributed::DistributedBackend;
pub use key::RateLimitKey;
pub use limiter::RateLimiter;
pub use memory::InMemoryBackend;
pub use window::{Clock, ManualClock, MonotonicClock, WindowLog};

use crate::config::{BackendKind, RateLimitConfig};

/// Build the backend selected by configuration.
///
/// The Redis backend connects and probes the store here, so an unreachable
/// store fails startup instead of the first request.
pub async fn build_backend(config: &RateLimitConfig) -> Result<Arc<dyn RateLimitBackend>, RateLimitError> {
    match config.backend {
        BackendKind::Memory => {
            info!("Rate limiter using in-memory backend");
            let backend = Arc::new(InMemoryBackend::new());
            backend.spawn_sweeper(config.window_seconds);
            Ok(backend)
        }
        BackendKind::Redis => {
            info!(redis_url = %config.redis_url, "Rate limiter using Redis backend");
            let backend = DistributedBackend::new(&config.redis_url)?
                .with_connect_timeout(Duration::from_millis(config.connect_timeout_ms))
                .with_command_timeout(Duration::from_millis(config.command_timeout_ms));
            // Fail startup rather than the first request.
            backend.verify_connection().await?;
            Ok(Arc::new(backend))
        }
    }
}
