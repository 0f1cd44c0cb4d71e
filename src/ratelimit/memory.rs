//! In-process rate limit backend.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::backend::{RateLimitBackend, RateLimitError, RateLimitResult};
use super::window::{Clock, MonotonicClock, WindowLog};

/// Sliding-window backend keeping request logs in a process-local map.
///
/// Every operation on a key runs under that key's map entry lock with no
/// suspension point in between, so prune, count and insert are atomic with
/// respect to other callers. Nothing survives a restart and nothing is
/// shared between processes.
#[derive(Debug)]
pub struct InMemoryBackend {
    /// Request logs indexed by rate limit key
    windows: DashMap<String, WindowLog>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBackend {
    /// Create a backend driven by a monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create a backend driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Clear all request logs.
    pub fn reset(&self) {
        self.windows.clear();
    }

    /// Number of keys currently holding a request log.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop keys whose records have all aged out of `window_seconds`.
    ///
    /// Returns the number of keys removed.
    pub fn purge_expired(&self, window_seconds: u64) -> usize {
        let now = self.clock.now_millis();
        let window_ms = window_seconds.saturating_mul(1000);
        let before = self.windows.len();

        self.windows.retain(|_, log| {
            log.prune(now, window_ms);
            !log.is_empty()
        });

        before.saturating_sub(self.windows.len())
    }

    /// Periodically purge idle keys until the backend is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, window_seconds: u64) -> JoinHandle<()> {
        let backend: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_secs(window_seconds.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(backend) = backend.upgrade() else {
                    break;
                };
                let purged = backend.purge_expired(window_seconds);
                if purged > 0 {
                    debug!(purged, "Purged idle rate limit windows");
                }
            }
        })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryBackend {
    async fn check_and_consume(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<RateLimitResult, RateLimitError> {
        // Get or create the log; the entry guard is held until we return
        let mut log = self.windows.entry(key.to_string()).or_default();
        // Read the clock under the entry lock so records stay in order.
        let now = self.clock.now_millis();
        let result = log.try_admit(now, limit, window_seconds);

        trace!(
            key = %key,
            allowed = result.allowed,
            remaining = result.remaining,
            "Evaluated in-memory window"
        );

        Ok(result)
    }

    async fn get_remaining(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<u32, RateLimitError> {
        let remaining = match self.windows.get_mut(key) {
            Some(mut log) => {
                let now = self.clock.now_millis();
                log.remaining(now, limit, window_seconds)
            }
            None => limit,
        };
        Ok(remaining)
    }

    async fn close(&self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::window::ManualClock;
    use futures::future::join_all;

    #[tokio::test]
    async fn test_allows_first_request() {
        let backend = InMemoryBackend::new();

        let result = backend.check_and_consume("test-key", 10, 60).await.unwrap();

        assert!(result.allowed);
        assert_eq!(result.remaining, 9);
        assert_eq!(result.retry_after, 0);
    }

    #[tokio::test]
    async fn test_counts_down_then_denies() {
        let backend = InMemoryBackend::new();

        for expected in [4, 3, 2, 1, 0] {
            let result = backend.check_and_consume("test-key", 5, 60).await.unwrap();
            assert!(result.allowed);
            assert_eq!(result.remaining, expected);
        }

        let result = backend.check_and_consume("test-key", 5, 60).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert!(result.retry_after >= 1);
    }

    #[tokio::test]
    async fn test_different_keys_have_separate_limits() {
        let backend = InMemoryBackend::new();

        for _ in 0..3 {
            backend.check_and_consume("key1", 3, 60).await.unwrap();
        }

        assert!(!backend.check_and_consume("key1", 3, 60).await.unwrap().allowed);
        assert_eq!(backend.get_remaining("key2", 3, 60).await.unwrap(), 3);
        assert!(backend.check_and_consume("key2", 3, 60).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_get_remaining_does_not_consume() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.get_remaining("test-key", 5, 60).await.unwrap(), 5);

        backend.check_and_consume("test-key", 5, 60).await.unwrap();
        for _ in 0..10 {
            backend.get_remaining("test-key", 5, 60).await.unwrap();
        }

        assert_eq!(backend.get_remaining("test-key", 5, 60).await.unwrap(), 4);
        let next = backend.check_and_consume("test-key", 5, 60).await.unwrap();
        assert_eq!(next.remaining, 3);
    }

    #[tokio::test]
    async fn test_get_remaining_on_unknown_key_creates_nothing() {
        let backend = InMemoryBackend::new();
        backend.get_remaining("ghost", 5, 60).await.unwrap();
        assert_eq!(backend.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_close_and_reset_clear_data() {
        let backend = InMemoryBackend::new();
        backend.check_and_consume("key1", 5, 60).await.unwrap();
        backend.check_and_consume("key2", 5, 60).await.unwrap();

        backend.close().await;
        backend.close().await;
        assert_eq!(backend.get_remaining("key1", 5, 60).await.unwrap(), 5);

        backend.check_and_consume("key1", 5, 60).await.unwrap();
        backend.reset();
        assert_eq!(backend.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_remaining_never_negative() {
        let backend = InMemoryBackend::new();

        for _ in 0..10 {
            let result = backend.check_and_consume("test-key", 3, 60).await.unwrap();
            assert!(result.allowed || result.retry_after >= 1);
        }

        assert_eq!(backend.get_remaining("test-key", 3, 60).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_tracks_oldest_record() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = InMemoryBackend::with_clock(clock.clone());

        backend.check_and_consume("k", 2, 10).await.unwrap();
        clock.advance(Duration::from_millis(4_000));
        backend.check_and_consume("k", 2, 10).await.unwrap();
        clock.advance(Duration::from_millis(2_300));

        // Oldest record (t=0) exits at t=10s; now is t=6.3s.
        let result = backend.check_and_consume("k", 2, 10).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.retry_after, 4);
    }

    #[tokio::test]
    async fn test_expiry_recovery_with_manual_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = InMemoryBackend::with_clock(clock.clone());

        for _ in 0..3 {
            backend.check_and_consume("k", 3, 1).await.unwrap();
        }
        assert!(!backend.check_and_consume("k", 3, 1).await.unwrap().allowed);

        clock.advance(Duration::from_millis(1_001));
        let result = backend.check_and_consume("k", 3, 1).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
    }

    #[tokio::test]
    async fn test_expired_entries_cleaned_up_after_sleep() {
        let backend = InMemoryBackend::new();

        for _ in 0..3 {
            backend.check_and_consume("test-key", 3, 1).await.unwrap();
        }
        assert!(!backend.check_and_consume("test-key", 3, 1).await.unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let result = backend.check_and_consume("test-key", 3, 1).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_admit_exactly_limit() {
        let backend = Arc::new(InMemoryBackend::new());

        let tasks = (0..20).map(|_| {
            let backend = backend.clone();
            tokio::spawn(async move { backend.check_and_consume("hot-key", 10, 60).await })
        });
        let results: Vec<RateLimitResult> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let allowed = results.iter().filter(|r| r.allowed).count();
        assert_eq!(allowed, 10);
        assert_eq!(results.len() - allowed, 10);
    }

    #[tokio::test]
    async fn test_purge_expired_drops_idle_keys() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = InMemoryBackend::with_clock(clock.clone());

        backend.check_and_consume("old", 5, 10).await.unwrap();
        clock.advance(Duration::from_secs(6));
        backend.check_and_consume("fresh", 5, 10).await.unwrap();
        clock.advance(Duration::from_secs(5));

        assert_eq!(backend.purge_expired(10), 1);
        assert_eq!(backend.tracked_keys(), 1);
        assert_eq!(backend.get_remaining("fresh", 5, 10).await.unwrap(), 4);
    }
}
