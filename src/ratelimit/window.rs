//! Sliding-window request log and the clocks that drive it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::backend::RateLimitResult;

/// Source of "now" for window math, in milliseconds.
///
/// Only differences between readings matter, so implementations are free to
/// pick any origin as long as readings never go backwards.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;
}

/// Clock backed by [`Instant`], immune to wall-clock adjustments.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock.
///
/// This is primarily useful for testing window expiry without sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Whole seconds until a record stamped `oldest` leaves the window, at least 1.
pub fn retry_after_secs(oldest: u64, now: u64, window_ms: u64) -> u64 {
    (oldest + window_ms).saturating_sub(now).div_ceil(1000).max(1)
}

/// Timestamps of the admitted requests for one key, oldest first.
///
/// Duplicate timestamps are kept as separate entries, so requests landing in
/// the same millisecond are each counted.
#[derive(Debug, Default, Clone)]
pub struct WindowLog {
    records: VecDeque<u64>,
}

impl WindowLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record whose age has reached the window length.
    pub fn prune(&mut self, now: u64, window_ms: u64) {
        while let Some(&oldest) = self.records.front() {
            if now.saturating_sub(oldest) >= window_ms {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Prune, then admit a request at `now` if the window still has room.
    pub fn try_admit(&mut self, now: u64, limit: u32, window_seconds: u64) -> RateLimitResult {
        let window_ms = window_seconds.saturating_mul(1000);
        self.prune(now, window_ms);

        let count = self.records.len() as u64;
        let limit = u64::from(limit);

        if count < limit {
            self.records.push_back(now);
            return RateLimitResult::admitted((limit - count - 1) as u32);
        }

        let retry_after = match self.records.front() {
            Some(&oldest) => retry_after_secs(oldest, now, window_ms),
            None => window_seconds.max(1),
        };
        RateLimitResult::denied(retry_after)
    }

    /// Prune, then report how many more requests the window would admit.
    pub fn remaining(&mut self, now: u64, limit: u32, window_seconds: u64) -> u32 {
        self.prune(now, window_seconds.saturating_mul(1000));
        u64::from(limit).saturating_sub(self.records.len() as u64) as u32
    }
}
