use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::models::ModerationRule;
use crate::redis_client::RedisClient;

const RULES_KEY: &str = "moderation:rules";

/// Read-only source of moderator keyword rules, in declaration order.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<ModerationRule>>;
}

/// Rules kept as JSON entries in a Redis list, re-read on every request so
/// moderator edits apply immediately.
#[derive(Clone)]
pub struct RedisRuleSource {
    redis: RedisClient,
}

impl RedisRuleSource {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RuleSource for RedisRuleSource {
    async fn list_rules(&self) -> Result<Vec<ModerationRule>> {
        let entries = self
            .redis
            .lrange(RULES_KEY, 0, -1)
            .await
            .map_err(|e| anyhow!("Failed to load moderation rules: {}", e))?;

        Ok(parse_rule_entries(&entries))
    }
}

fn parse_rule_entries(entries: &[String]) -> Vec<ModerationRule> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| match serde_json::from_str::<ModerationRule>(raw) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed moderation rule");
                None
            }
        })
        .collect()
}

/// Fixed rule set, loaded once from a JSON file or built in code.
#[derive(Clone, Default)]
pub struct StaticRuleSource {
    rules: Vec<ModerationRule>,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<ModerationRule>) -> Self {
        Self { rules }
    }

    /// Load a JSON array of rules
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read moderation rules file {}", path))?;
        let rules: Vec<ModerationRule> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse moderation rules file {}", path))?;
        Ok(Self { rules })
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn list_rules(&self) -> Result<Vec<ModerationRule>> {
        Ok(self.rules.clone())
    }
}
