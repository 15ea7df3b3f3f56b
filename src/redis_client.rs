use redis::{aio::ConnectionManager, AsyncCommands, ErrorKind, RedisError, RedisResult, Script};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::future::Future;
use std::time::Duration;

/// INCR the window counter and arm its expiry on the first hit (or if the TTL
/// was lost), returning `{attempts, remaining_ms}` in one atomic step.
static WINDOW_INCR_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        local count = redis.call('INCR', KEYS[1])
        local ttl = redis.call('PTTL', KEYS[1])
        if count == 1 or ttl < 0 then
            redis.call('PEXPIRE', KEYS[1], ARGV[1])
            ttl = tonumber(ARGV[1])
        end
        return {count, ttl}
        ",
    )
});

/// Redis client wrapper shared by the counter store, rule source and flag sink.
///
/// Every command is bounded by `command_timeout`; expiry surfaces as an I/O error.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl RedisClient {
    /// Create a new Redis client from a connection URL
    ///
    /// Supports both plain (redis://) and encrypted (rediss://) connections.
    /// A URL without a password is accepted but logged, since production
    /// deployments should always authenticate.
    pub async fn new(redis_url: &str, command_timeout: Duration) -> Result<Self> {
        if !redis_url.contains("://") {
            return Err(anyhow::anyhow!(
                "Invalid Redis URL format. Expected: redis://:password@host:port or rediss://:password@host:port"
            ));
        }

        if !redis_url.contains('@') {
            tracing::warn!("Redis URL does not include a password; use redis://:password@host:port in production");
        }

        let client = redis::Client::open(redis_url)
            .context("Failed to create Redis client from URL")?;

        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to create Redis connection manager - check REDIS_URL and password")?;

        Ok(Self {
            manager,
            command_timeout,
        })
    }

    async fn bounded<T>(&self, command: impl Future<Output = RedisResult<T>>) -> RedisResult<T> {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(result) => result,
            Err(_) => Err(RedisError::from((ErrorKind::IoError, "Redis command timed out"))),
        }
    }

    /// Atomically increment a fixed-window counter.
    /// Returns the new attempt count and the milliseconds left in the window.
    pub async fn increment_window(&self, key: &str, window_ms: u64) -> Result<(i64, i64), RedisError> {
        let mut conn = self.manager.clone();
        self.bounded(WINDOW_INCR_SCRIPT.key(key).arg(window_ms).invoke_async(&mut conn))
            .await
    }

    /// Delete a key
    pub async fn del(&self, key: &str) -> Result<(), RedisError> {
        let mut conn = self.manager.clone();
        self.bounded(conn.del(key)).await
    }

    /// Add to a list (left push)
    pub async fn lpush(&self, key: &str, value: &str) -> Result<(), RedisError> {
        let mut conn = self.manager.clone();
        self.bounded(conn.lpush(key, value)).await
    }

    /// Get a range from a list
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, RedisError> {
        let mut conn = self.manager.clone();
        self.bounded(conn.lrange(key, start, stop)).await
    }

    /// Ping Redis to check if connection is alive
    pub async fn ping(&self) -> Result<bool, RedisError> {
        let mut conn = self.manager.clone();
        self.bounded(redis::cmd("PING").query_async::<_, String>(&mut conn))
            .await
            .map(|resp| resp == "PONG")
    }
}
