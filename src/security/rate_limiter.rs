use crate::security::counter_store::CounterStore;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

/// Rate limiter using a fixed window per (client, action) on a shared counter store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    store_timeout: Duration,
}

/// Budget for one counter store call unless configured otherwise
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitType {
    /// Sign-in / sign-up attempts: 5 per 15 minutes, fails closed
    Auth,
    /// Content moderation calls: 30 per 5 minutes, fails open
    Moderation,
}

impl RateLimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitType::Auth => "auth",
            RateLimitType::Moderation => "moderation",
        }
    }

    /// Get the default policy for this action
    pub fn default_policy(&self) -> RateLimitPolicy {
        match self {
            RateLimitType::Auth => RateLimitPolicy::new(5, Duration::from_secs(15 * 60)),
            RateLimitType::Moderation => RateLimitPolicy::new(30, Duration::from_secs(5 * 60)),
        }
    }

    /// Get the store key prefix
    fn key_prefix(&self) -> &str {
        match self {
            RateLimitType::Auth => "ratelimit:auth",
            RateLimitType::Moderation => "ratelimit:moderation",
        }
    }

    pub fn counter_key(&self, client_key: &str) -> String {
        format!("{}:{}", self.key_prefix(), client_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub attempts: u32,
    pub remaining: u32,
    /// Whole seconds until the window rolls over; only meaningful when denied
    pub retry_after: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every counter store call; an expired call is reported as a store error
    pub fn with_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Check if a request is allowed under the rate limit, counting it as an attempt
    ///
    /// The increment and the read happen in one store operation, so concurrent
    /// requests from one client can never both see room under the limit.
    pub async fn check_rate_limit(
        &self,
        client_key: &str,
        limit_type: RateLimitType,
        policy: RateLimitPolicy,
    ) -> Result<RateLimitResult> {
        let key = limit_type.counter_key(client_key);
        let counter = tokio::time::timeout(self.store_timeout, self.store.increment(&key, policy.window))
            .await
            .map_err(|_| anyhow!("Counter store timed out after {:?}", self.store_timeout))??;

        if counter.attempts > policy.max_attempts {
            metrics::counter!("rate_limit_denied_total", 1, "action" => limit_type.as_str());
            return Ok(RateLimitResult {
                allowed: false,
                attempts: counter.attempts,
                remaining: 0,
                retry_after: retry_after_secs(counter.expires_in),
            });
        }

        Ok(RateLimitResult {
            allowed: true,
            attempts: counter.attempts,
            remaining: policy.max_attempts - counter.attempts,
            retry_after: 0,
        })
    }

    /// Drop the counter for a client, e.g. after a successful sign-in
    pub async fn clear(&self, client_key: &str, limit_type: RateLimitType) -> Result<()> {
        tokio::time::timeout(self.store_timeout, self.store.clear(&limit_type.counter_key(client_key)))
            .await
            .map_err(|_| anyhow!("Counter store timed out after {:?}", self.store_timeout))?
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }
}

/// Remaining window rounded up to whole seconds, never zero for a denial.
fn retry_after_secs(expires_in: Duration) -> u64 {
    let millis = expires_in.as_millis() as u64;
    ((millis + 999) / 1000).max(1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::security::counter_store::{MemoryCounterStore, WindowCounter};
    use async_trait::async_trait;
    use futures::future::join_all;

    /// Store that accepts the call and never answers, like a hung Redis
    pub struct HangingStore;

    #[async_trait]
    impl CounterStore for HangingStore {
        async fn increment(&self, _key: &str, _window: Duration) -> Result<WindowCounter> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(WindowCounter {
                attempts: 1,
                expires_in: Duration::from_secs(60),
            })
        }

        async fn clear(&self, _key: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()))
    }

    #[test]
    fn test_rate_limit_type_values() {
        let auth = RateLimitType::Auth.default_policy();
        assert_eq!(auth.max_attempts, 5);
        assert_eq!(auth.window, Duration::from_secs(900));

        let moderation = RateLimitType::Moderation.default_policy();
        assert_eq!(moderation.max_attempts, 30);
        assert_eq!(moderation.window, Duration::from_secs(300));

        assert_eq!(RateLimitType::Auth.counter_key("abc"), "ratelimit:auth:abc");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_max_then_denies() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new(3, Duration::from_secs(60));

        for attempt in 1..=3 {
            let result = limiter
                .check_rate_limit("client", RateLimitType::Auth, policy)
                .await
                .unwrap();
            assert!(result.allowed, "attempt {} should be allowed", attempt);
            assert_eq!(result.remaining, 3 - attempt);
        }

        tokio::time::advance(Duration::from_secs(15)).await;
        let denied = limiter
            .check_rate_limit("client", RateLimitType::Auth, policy)
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_window_after_expiry() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new(1, Duration::from_secs(60));

        assert!(limiter.check_rate_limit("c", RateLimitType::Moderation, policy).await.unwrap().allowed);
        assert!(!limiter.check_rate_limit("c", RateLimitType::Moderation, policy).await.unwrap().allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        let result = limiter
            .check_rate_limit("c", RateLimitType::Moderation, policy)
            .await
            .unwrap();
        assert!(result.allowed);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_store_times_out() {
        let limiter = RateLimiter::new(Arc::new(HangingStore)).with_timeout(Duration::from_millis(250));
        let policy = RateLimitPolicy::new(5, Duration::from_secs(60));

        let started = tokio::time::Instant::now();
        let err = limiter
            .check_rate_limit("c", RateLimitType::Auth, policy)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(limiter.clear("c", RateLimitType::Auth).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_resets_exhausted_window() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new(1, Duration::from_secs(900));

        limiter.check_rate_limit("c", RateLimitType::Auth, policy).await.unwrap();
        assert!(!limiter.check_rate_limit("c", RateLimitType::Auth, policy).await.unwrap().allowed);

        limiter.clear("c", RateLimitType::Auth).await.unwrap();
        assert!(limiter.check_rate_limit("c", RateLimitType::Auth, policy).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_actions_are_counted_separately() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new(1, Duration::from_secs(60));

        assert!(limiter.check_rate_limit("c", RateLimitType::Auth, policy).await.unwrap().allowed);
        assert!(limiter.check_rate_limit("c", RateLimitType::Moderation, policy).await.unwrap().allowed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_never_exceed_limit() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new(7, Duration::from_secs(60));

        let tasks = (0..50).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .check_rate_limit("burst", RateLimitType::Moderation, policy)
                    .await
                    .unwrap()
                    .allowed
            })
        });

        let results: Vec<bool> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|allowed| **allowed).count(), 7);
        assert_eq!(results.iter().filter(|allowed| !**allowed).count(), 43);
    }
}
