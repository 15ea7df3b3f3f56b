use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::redis_client::RedisClient;

/// Snapshot of a fixed-window counter right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    /// Attempts recorded in the current window, including this one.
    pub attempts: u32,
    /// Time left until the window rolls over (`window - (now - window_start)`).
    pub expires_in: Duration,
}

/// Durable counters shared by every gateway instance.
///
/// `increment` must be a single atomic increment-or-create: two concurrent
/// callers on the same key always observe distinct attempt numbers.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCounter>;

    async fn clear(&self, key: &str) -> Result<()>;

    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Counter store backed by Redis; safe across replicated instances.
#[derive(Clone)]
pub struct RedisCounterStore {
    redis: RedisClient,
}

impl RedisCounterStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCounter> {
        let window_ms = window.as_millis().max(1) as u64;
        let (attempts, remaining_ms) = self
            .redis
            .increment_window(key, window_ms)
            .await
            .map_err(|e| anyhow!("Failed to increment counter: {}", e))?;

        Ok(WindowCounter {
            attempts: attempts.clamp(0, u32::MAX as i64) as u32,
            expires_in: Duration::from_millis(remaining_ms.clamp(0, window_ms as i64) as u64),
        })
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.redis
            .del(key)
            .await
            .map_err(|e| anyhow!("Failed to clear counter: {}", e))
    }

    async fn ping(&self) -> Result<bool> {
        self.redis
            .ping()
            .await
            .map_err(|e| anyhow!("Failed to ping Redis: {}", e))
    }
}

/// Expired windows are dropped at most this often, under the same lock.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// In-process counter store for development and tests.
///
/// Only correct for a single instance: replicas would each keep their own counts.
pub struct MemoryCounterStore {
    inner: Mutex<MemoryCounters>,
}

struct MemoryCounters {
    /// key -> (attempts, window start, window length)
    windows: HashMap<String, (u32, Instant, Duration)>,
    next_sweep: Instant,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryCounters {
                windows: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_PERIOD,
            }),
        }
    }

    /// Number of windows currently held, expired or not
    pub fn len(&self) -> usize {
        self.inner.lock().windows.len()
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCounter> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if now >= inner.next_sweep {
            inner
                .windows
                .retain(|_, (_, started, length)| now.duration_since(*started) < *length);
            inner.next_sweep = now + SWEEP_PERIOD;
        }

        let entry = inner
            .windows
            .entry(key.to_string())
            .or_insert((0, now, window));

        // An expired window is replaced, never incremented.
        if now.duration_since(entry.1) >= window {
            *entry = (0, now, window);
        }
        entry.0 = entry.0.saturating_add(1);

        Ok(WindowCounter {
            attempts: entry.0,
            expires_in: window.saturating_sub(now.duration_since(entry.1)),
        })
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.inner.lock().windows.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_counts_within_window() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        let first = store.increment("k", window).await.unwrap();
        assert_eq!(first.attempts, 1);
        assert_eq!(first.expires_in, window);

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = store.increment("k", window).await.unwrap();
        assert_eq!(second.attempts, 2);
        assert_eq!(second.expires_in, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_resets_after_window() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        store.increment("k", window).await.unwrap();
        store.increment("k", window).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let fresh = store.increment("k", window).await.unwrap();
        assert_eq!(fresh.attempts, 1);
        assert_eq!(fresh.expires_in, window);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_sweeps_expired_windows() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(300);

        for i in 0..50 {
            store.increment(&format!("client-{}", i), window).await.unwrap();
        }
        assert_eq!(store.len(), 50);

        tokio::time::advance(window).await;
        store.increment("late", window).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_clear_and_key_isolation() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        store.increment("a", window).await.unwrap();
        store.increment("a", window).await.unwrap();
        assert_eq!(store.increment("b", window).await.unwrap().attempts, 1);

        store.clear("a").await.unwrap();
        assert_eq!(store.increment("a", window).await.unwrap().attempts, 1);
    }
}
