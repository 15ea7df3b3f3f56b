use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::models::ContentFlag;
use crate::redis_client::RedisClient;

const FLAGS_KEY: &str = "moderation:flags";

/// Append-only destination for content flags awaiting human review.
#[async_trait]
pub trait FlagSink: Send + Sync {
    async fn insert(&self, flag: &ContentFlag) -> Result<()>;
}

/// Pushes JSON-encoded flags onto a Redis list consumed by the review queue.
#[derive(Clone)]
pub struct RedisFlagSink {
    redis: RedisClient,
}

impl RedisFlagSink {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl FlagSink for RedisFlagSink {
    async fn insert(&self, flag: &ContentFlag) -> Result<()> {
        let json = serde_json::to_string(flag)?;
        self.redis
            .lpush(FLAGS_KEY, &json)
            .await
            .map_err(|e| anyhow!("Failed to persist content flag: {}", e))
    }
}

/// Keeps flags in memory (development, tests).
#[derive(Default)]
pub struct MemoryFlagSink {
    flags: Mutex<Vec<ContentFlag>>,
}

impl MemoryFlagSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> Vec<ContentFlag> {
        self.flags.lock().clone()
    }
}

#[async_trait]
impl FlagSink for MemoryFlagSink {
    async fn insert(&self, flag: &ContentFlag) -> Result<()> {
        self.flags.lock().push(flag.clone());
        Ok(())
    }
}
