//! Distributed rate limit backend using Redis sorted sets.
//!
//! Each key is a sorted set whose members are `{timestamp}:{random}` strings
//! scored by their millisecond timestamp. The whole prune, count and insert
//! sequence runs as one Lua script, so Redis serializes concurrent callers
//! and no gateway instance can slip in between the count and the insert.
//! Scripts read the Redis server clock, which gives every instance the same
//! time base.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{RedisError, Script};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

use super::backend::{RateLimitBackend, RateLimitError, RateLimitResult};

/// Default bound on establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default bound on one script round trip.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// KEYS[1] = window key; ARGV = limit, window seconds, member suffix.
/// Returns {allowed, remaining, retry_after}.
const CHECK_AND_CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_seconds = tonumber(ARGV[2])
local window_ms = window_seconds * 1000
local time = redis.call('TIME')
local now = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window_ms)
local count = redis.call('ZCARD', key)

if count < limit then
    redis.call('ZADD', key, now, now .. ':' .. ARGV[3])
    redis.call('EXPIRE', key, window_seconds * 2)
    return {1, limit - count - 1, 0}
end

local retry_after = window_seconds
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    retry_after = math.ceil((tonumber(oldest[2]) + window_ms - now) / 1000)
end
if retry_after < 1 then
    retry_after = 1
end
return {0, 0, retry_after}
"#;

/// KEYS[1] = window key; ARGV = limit, window seconds.
/// Returns the remaining count, which may be negative if the limit shrank.
const REMAINING_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2]) * 1000
local time = redis.call('TIME')
local now = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window_ms)
return limit - redis.call('ZCARD', key)
"#;

/// Sliding-window backend shared by every gateway instance pointing at the
/// same Redis.
///
/// The connection is opened on first use (or eagerly via [`connect`]) and
/// cached. Every round trip is bounded by a timeout, and any connection
/// failure, command error or timeout is reported as
/// [`RateLimitError::Unavailable`], never as a denial.
///
/// [`connect`]: DistributedBackend::connect
pub struct DistributedBackend {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    connect_timeout: Duration,
    command_timeout: Duration,
    consume_script: Script,
    remaining_script: Script,
}

impl DistributedBackend {
    /// Create a backend for `url` without connecting yet.
    pub fn new(url: &str) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url).map_err(|e| {
            RateLimitError::InvalidConfig(format!("invalid Redis URL: {}", e))
        })?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            consume_script: Script::new(CHECK_AND_CONSUME_SCRIPT),
            remaining_script: Script::new(REMAINING_SCRIPT),
        })
    }

    /// Override the bound on establishing a connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the bound on a single script round trip.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Create a backend and verify the store is reachable.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, RateLimitError> {
        let backend = Self::new(url)?.with_connect_timeout(connect_timeout);
        backend.verify_connection().await?;
        Ok(backend)
    }

    /// Open and probe the connection now instead of on first use.
    pub async fn verify_connection(&self) -> Result<(), RateLimitError> {
        self.connection().await?;
        info!("Connected to Redis for rate limiting");
        Ok(())
    }

    /// Return the cached connection, opening and probing a new one if needed.
    async fn connection(&self) -> Result<MultiplexedConnection, RateLimitError> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        // Handshake and probe share one deadline.
        let open = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, RedisError>(conn)
        };

        let conn = match tokio::time::timeout(self.connect_timeout, open).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                error!(error = %e, "Redis connection failed");
                return Err(RateLimitError::unavailable("redis_connection_failed", e.to_string()));
            }
            Err(_) => {
                error!(timeout_ms = self.connect_timeout.as_millis() as u64, "Redis connection timed out");
                return Err(RateLimitError::unavailable(
                    "redis_connection_failed",
                    "connection timed out",
                ));
            }
        };

        debug!("Opened Redis connection for rate limiting");
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Await a command under the command timeout.
    ///
    /// A store that accepts the request but never answers is treated like a
    /// broken connection: the cached connection is discarded.
    async fn bounded<T, F>(&self, operation: &'static str, command: F) -> Result<T, RateLimitError>
    where
        F: Future<Output = Result<T, RedisError>> + Send,
    {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.store_fault(operation, e).await),
            Err(_) => {
                error!(
                    operation,
                    timeout_ms = self.command_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                self.connection.lock().await.take();
                Err(RateLimitError::unavailable("redis_error", "command timed out"))
            }
        }
    }

    /// Classify a command failure, dropping the cached connection if it is dead.
    async fn store_fault(&self, operation: &'static str, err: RedisError) -> RateLimitError {
        error!(operation, error = %err, "Redis rate limit error");
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            self.connection.lock().await.take();
        }
        RateLimitError::unavailable("redis_error", err.to_string())
    }
}

#[async_trait]
impl RateLimitBackend for DistributedBackend {
    async fn check_and_consume(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<RateLimitResult, RateLimitError> {
        let mut conn = self.connection().await?;
        let suffix = format!("{:016x}", rand::random::<u64>());

        let (allowed, remaining, retry_after): (i64, i64, i64) = self
            .bounded(
                "check_and_consume",
                self.consume_script
                    .key(key)
                    .arg(limit)
                    .arg(window_seconds)
                    .arg(suffix)
                    .invoke_async(&mut conn),
            )
            .await?;

        trace!(key = %key, allowed, remaining, retry_after, "Evaluated Redis window");

        if allowed == 1 {
            Ok(RateLimitResult::admitted(remaining.max(0) as u32))
        } else {
            Ok(RateLimitResult::denied(retry_after.max(1) as u64))
        }
    }

    async fn get_remaining(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<u32, RateLimitError> {
        let mut conn = self.connection().await?;

        let remaining: i64 = self
            .bounded(
                "get_remaining",
                self.remaining_script
                    .key(key)
                    .arg(limit)
                    .arg(window_seconds)
                    .invoke_async(&mut conn),
            )
            .await?;

        Ok(remaining.max(0) as u32)
    }

    async fn close(&self) {
        if self.connection.lock().await.take().is_some() {
            debug!("Closed Redis rate limit connection");
        }
    }
}
