use crate::config::{Config, StoreBackend};
use crate::redis_client::RedisClient;
use crate::security::{
    auth_gateway::AuthProvider,
    classifier::Classifier,
    flags::FlagSink,
    rules::RuleSource,
    AuditLogger,
    AuthGateway,
    CompositeKeyGenerator,
    CounterStore,
    HttpAuthProvider,
    HttpClassifier,
    MemoryCounterStore,
    MemoryFlagSink,
    ModerationService,
    RateLimiter,
    RedisCounterStore,
    RedisFlagSink,
    RedisRuleSource,
    StaticRuleSource,
};
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::IpAddr;
use std::sync::Arc;

const AUDIT_CHANNEL_CAPACITY: usize = 1024;

/// Collaborators the gateway is assembled from
pub struct Collaborators {
    pub counters: Arc<dyn CounterStore>,
    pub rules: Arc<dyn RuleSource>,
    pub classifier: Arc<dyn Classifier>,
    pub flags: Arc<dyn FlagSink>,
    pub auth_provider: Arc<dyn AuthProvider>,
}

#[derive(Clone)]
pub struct AppState {
    pub key_generator: CompositeKeyGenerator,
    pub rate_limiter: RateLimiter,
    pub moderation_service: ModerationService,
    pub auth_gateway: AuthGateway,
    pub audit: AuditLogger,
    pub metrics: Option<PrometheusHandle>,
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    /// Build the state from configuration, connecting to Redis when it is the backend
    pub async fn new(config: &Config, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(&config.classifier)?);
        let auth_provider: Arc<dyn AuthProvider> = Arc::new(HttpAuthProvider::new(&config.auth_provider)?);
        let static_rules = match &config.rules_file {
            Some(path) => Some(StaticRuleSource::from_file(path)?),
            None => None,
        };

        let collaborators = match config.store_backend {
            StoreBackend::Redis => {
                let redis = RedisClient::new(&config.redis_url, config.store_timeout).await?;
                let rules: Arc<dyn RuleSource> = match static_rules {
                    Some(rules) => Arc::new(rules),
                    None => Arc::new(RedisRuleSource::new(redis.clone())),
                };
                Collaborators {
                    counters: Arc::new(RedisCounterStore::new(redis.clone())),
                    rules,
                    classifier,
                    flags: Arc::new(RedisFlagSink::new(redis)),
                    auth_provider,
                }
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory counters and flags; limits are per-instance only");
                Collaborators {
                    counters: Arc::new(MemoryCounterStore::new()),
                    rules: Arc::new(static_rules.unwrap_or_default()),
                    classifier,
                    flags: Arc::new(MemoryFlagSink::new()),
                    auth_provider,
                }
            }
        };

        Ok(Self::from_parts(
            config,
            collaborators,
            AuditLogger::spawn(AUDIT_CHANNEL_CAPACITY),
            metrics,
        ))
    }

    pub fn from_parts(
        config: &Config,
        collaborators: Collaborators,
        audit: AuditLogger,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(collaborators.counters).with_timeout(config.store_timeout);
        let moderation_service = ModerationService::new(
            rate_limiter.clone(),
            config.moderation_policy,
            collaborators.rules,
            collaborators.classifier,
            collaborators.flags,
        );
        let auth_gateway = AuthGateway::new(
            rate_limiter.clone(),
            config.auth_policy,
            collaborators.auth_provider,
        );

        Self {
            key_generator: CompositeKeyGenerator::new(config.server_secret.clone()),
            rate_limiter,
            moderation_service,
            auth_gateway,
            audit,
            metrics,
            trusted_proxies: config.trusted_proxies.clone().into(),
        }
    }
}
