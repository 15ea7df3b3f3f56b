use serde_json::json;
use std::sync::Arc;

use crate::models::{ContentFlag, ModerationRequest, ModerationVerdict, RuleAction};
use crate::security::classifier::Classifier;
use crate::security::content_filter::{ContentFilter, RuleMatch};
use crate::security::flags::FlagSink;
use crate::security::rate_limiter::{RateLimitPolicy, RateLimitType, RateLimiter};
use crate::security::rules::RuleSource;

/// Minimum classifier confidence before an AI verdict is persisted as a flag
pub const AI_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Confidence reported when a `flag` keyword rule is the only signal
pub const KEYWORD_FLAG_CONFIDENCE: f64 = 0.9;
/// Confidence of a deterministic `block` keyword hit
pub const KEYWORD_BLOCK_CONFIDENCE: f64 = 1.0;

/// Which signal produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPath {
    KeywordBlock,
    AiFlag,
    KeywordFlag,
    Clean,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPath::KeywordBlock => "keyword_block",
            DecisionPath::AiFlag => "ai_flag",
            DecisionPath::KeywordFlag => "keyword_flag",
            DecisionPath::Clean => "clean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub verdict: ModerationVerdict,
    pub path: DecisionPath,
    /// False if a flag should have been written but the sink failed
    pub flag_persisted: bool,
}

#[derive(Debug, Clone)]
pub enum ModerationOutcome {
    RateLimited { retry_after: u64 },
    Decided(Decision),
}

/// Decision engine combining keyword rules and the AI classifier
#[derive(Clone)]
pub struct ModerationService {
    limiter: RateLimiter,
    policy: RateLimitPolicy,
    rules: Arc<dyn RuleSource>,
    classifier: Arc<dyn Classifier>,
    flags: Arc<dyn FlagSink>,
}

impl ModerationService {
    pub fn new(
        limiter: RateLimiter,
        policy: RateLimitPolicy,
        rules: Arc<dyn RuleSource>,
        classifier: Arc<dyn Classifier>,
        flags: Arc<dyn FlagSink>,
    ) -> Self {
        Self {
            limiter,
            policy,
            rules,
            classifier,
            flags,
        }
    }

    /// Rate-check the client, then decide on the content
    ///
    /// Fails open: a counter store outage lets the request through.
    pub async fn moderate(&self, client_key: &str, request: &ModerationRequest) -> ModerationOutcome {
        match self
            .limiter
            .check_rate_limit(client_key, RateLimitType::Moderation, self.policy)
            .await
        {
            Ok(result) if !result.allowed => {
                return ModerationOutcome::RateLimited {
                    retry_after: result.retry_after,
                };
            }
            Ok(result) => {
                tracing::debug!(attempts = result.attempts, remaining = result.remaining, "Moderation attempt counted");
            }
            Err(e) => {
                metrics::counter!("rate_limit_store_errors_total", 1, "action" => "moderation");
                tracing::warn!(error = %e, "Moderation rate limit unavailable, failing open");
            }
        }

        ModerationOutcome::Decided(self.decide(request).await)
    }

    /// Run the keyword scan and, unless a block rule hit, the classifier
    ///
    /// Precedence: block keyword > confident AI verdict > flag keyword > safe.
    pub async fn decide(&self, request: &ModerationRequest) -> Decision {
        let rules = match self.rules.list_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load moderation rules, scanning with none");
                Vec::new()
            }
        };
        let filter = ContentFilter::new(rules);
        if filter.is_empty() {
            tracing::debug!("No moderation rules loaded");
        }
        let keyword_match = filter.scan(&request.content);

        if let Some(hit) = keyword_match.as_ref().filter(|hit| hit.action == RuleAction::Block) {
            let flag = ContentFlag::new(
                request.content_type,
                &request.content_id,
                &hit.category,
                KEYWORD_BLOCK_CONFIDENCE,
                json!({ "source": "keyword", "action": "block", "category": hit.category }),
            );
            let flag_persisted = self.persist(&flag, "keyword_block").await;
            return self.finish(ModerationVerdict::blocked(&hit.category), DecisionPath::KeywordBlock, flag_persisted);
        }

        if let Some(ai) = self.classifier.classify(&request.content, request.content_type).await {
            if !ai.safe && ai.confidence >= AI_CONFIDENCE_THRESHOLD {
                let flag_type = ai
                    .primary_issue
                    .clone()
                    .or_else(|| ai.issues.first().cloned())
                    .unwrap_or_else(|| "ai_flagged".to_string());
                let flag = ContentFlag::new(
                    request.content_type,
                    &request.content_id,
                    &flag_type,
                    ai.confidence,
                    json!({ "source": "ai", "issues": ai.issues, "primary_issue": ai.primary_issue }),
                );
                let flag_persisted = self.persist(&flag, "ai").await;
                let issues = if ai.issues.is_empty() { vec![flag_type.clone()] } else { ai.issues };
                return self.finish(
                    ModerationVerdict::flagged(issues, ai.confidence, &flag_type),
                    DecisionPath::AiFlag,
                    flag_persisted,
                );
            }
        }

        if let Some(RuleMatch { category, pattern, .. }) = keyword_match {
            let flag = ContentFlag::new(
                request.content_type,
                &request.content_id,
                &category,
                KEYWORD_FLAG_CONFIDENCE,
                json!({ "source": "keyword", "action": "flag", "category": category, "pattern": pattern }),
            );
            let flag_persisted = self.persist(&flag, "keyword_flag").await;
            return self.finish(
                ModerationVerdict::flagged(vec![category.clone()], KEYWORD_FLAG_CONFIDENCE, &category),
                DecisionPath::KeywordFlag,
                flag_persisted,
            );
        }

        self.finish(ModerationVerdict::safe(), DecisionPath::Clean, true)
    }

    /// Write a flag; a failed write is logged and never changes the verdict
    async fn persist(&self, flag: &ContentFlag, source: &'static str) -> bool {
        match self.flags.insert(flag).await {
            Ok(()) => {
                metrics::counter!("content_flags_total", 1, "source" => source);
                true
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    content_id = %flag.content_id,
                    content_type = %flag.content_type,
                    flag_type = %flag.flag_type,
                    "Failed to persist content flag"
                );
                false
            }
        }
    }

    fn finish(&self, verdict: ModerationVerdict, path: DecisionPath, flag_persisted: bool) -> Decision {
        metrics::counter!("moderation_decisions_total", 1, "path" => path.as_str());
        Decision {
            verdict,
            path,
            flag_persisted,
        }
    }
}
