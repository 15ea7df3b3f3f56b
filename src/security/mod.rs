pub mod audit;
pub mod auth_gateway;
pub mod classifier;
pub mod composite_key;
pub mod content_filter;
pub mod counter_store;
pub mod flags;
pub mod middleware;
pub mod moderation;
pub mod rate_limiter;
pub mod rules;

pub use audit::{AuditEntry, AuditLevel, AuditLogger};
pub use auth_gateway::{AuthGateway, HttpAuthProvider};
pub use classifier::HttpClassifier;
pub use composite_key::CompositeKeyGenerator;
pub use counter_store::{CounterStore, MemoryCounterStore, RedisCounterStore};
pub use flags::{MemoryFlagSink, RedisFlagSink};
pub use moderation::ModerationService;
pub use rate_limiter::RateLimiter;
pub use rules::{RedisRuleSource, StaticRuleSource};
