use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generic notice shown to submitters of unsafe content. The matched category
/// stays out of this text so rules cannot be probed from the client.
pub const GUIDELINES_NOTICE: &str = "This content may violate our community guidelines.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Comment,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Comment => "comment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "video" => Some(ContentType::Video),
            "comment" => Some(ContentType::Comment),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
    Flag,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Block => "block",
            RuleAction::Flag => "flag",
        }
    }
}

/// A moderator-managed keyword rule. Evaluated in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModerationRule {
    pub pattern: String,
    pub category: String,
    pub action: RuleAction,
    #[serde(default)]
    pub is_regex: bool,
}

impl ModerationRule {
    pub fn literal(pattern: &str, category: &str, action: RuleAction) -> Self {
        Self {
            pattern: pattern.to_string(),
            category: category.to_string(),
            action,
            is_regex: false,
        }
    }

    pub fn regex(pattern: &str, category: &str, action: RuleAction) -> Self {
        Self {
            pattern: pattern.to_string(),
            category: category.to_string(),
            action,
            is_regex: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    Pending,
    Reviewed,
    Dismissed,
}

/// Persisted record of content judged unsafe, awaiting human review.
///
/// Flags are append-only: moderating the same `content_id` twice produces two
/// rows unless the caller updates the earlier one itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentFlag {
    pub id: String,
    pub content_type: ContentType,
    pub content_id: String,
    pub flag_type: String,
    pub confidence: f64,
    pub detected_issues: serde_json::Value,
    pub status: FlagStatus,
    pub created_at: DateTime<Utc>,
}

impl ContentFlag {
    pub fn new(
        content_type: ContentType,
        content_id: &str,
        flag_type: &str,
        confidence: f64,
        detected_issues: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_type,
            content_id: content_id.to_string(),
            flag_type: flag_type.to_string(),
            confidence,
            detected_issues,
            status: FlagStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// The gateway's answer for one piece of content.
///
/// `blocked` implies `!safe`, and a safe verdict never lists issues.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub safe: bool,
    pub issues: Vec<String>,
    pub confidence: f64,
    pub flag_type: Option<String>,
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ModerationVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            issues: Vec::new(),
            confidence: 0.0,
            flag_type: None,
            blocked: false,
            message: None,
        }
    }

    pub fn blocked(category: &str) -> Self {
        Self {
            safe: false,
            issues: vec![category.to_string()],
            confidence: 1.0,
            flag_type: Some(category.to_string()),
            blocked: true,
            message: Some(GUIDELINES_NOTICE.to_string()),
        }
    }

    pub fn flagged(issues: Vec<String>, confidence: f64, flag_type: &str) -> Self {
        Self {
            safe: false,
            issues,
            confidence,
            flag_type: Some(flag_type.to_string()),
            blocked: false,
            message: Some(GUIDELINES_NOTICE.to_string()),
        }
    }
}

/// Validated body of `POST /moderate`.
#[derive(Clone, Debug)]
pub struct ModerationRequest {
    pub content: String,
    pub content_type: ContentType,
    pub content_id: String,
}

/// Body of `POST /moderate` as received, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawModerationRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthAction {
    Signin,
    Signup,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Signin => "signin",
            AuthAction::Signup => "signup",
        }
    }
}

/// Validated body of `POST /auth`.
#[derive(Clone)]
pub struct AuthRequest {
    pub action: AuthAction,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("action", &self.action)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Default, Deserialize)]
pub struct RawAuthRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthSession {
    pub user: serde_json::Value,
    pub session: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct RateLimitError {
    pub error: String,
    pub message: String,
    pub retry_after: u64,
}

impl RateLimitError {
    pub fn new(retry_after: u64) -> Self {
        Self {
            error: "rate_limit_exceeded".to_string(),
            message: format!(
                "Too many requests. Please wait {} before trying again.",
                format_wait(retry_after)
            ),
            retry_after,
        }
    }
}

/// 429 body for the moderation endpoint. It repeats a safe verdict so callers
/// that only read the body do not block legitimate content.
#[derive(Debug, Serialize)]
pub struct ModerationRateLimitError {
    #[serde(flatten)]
    pub limit: RateLimitError,
    pub safe: bool,
    pub blocked: bool,
    pub issues: Vec<String>,
    pub confidence: f64,
    pub flag_type: Option<String>,
}

impl ModerationRateLimitError {
    pub fn new(retry_after: u64) -> Self {
        Self {
            limit: RateLimitError::new(retry_after),
            safe: true,
            blocked: false,
            issues: Vec::new(),
            confidence: 0.0,
            flag_type: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationError {
    pub error: String,
    pub details: Vec<String>,
}

impl ValidationError {
    pub fn new(details: Vec<String>) -> Self {
        Self {
            error: "Validation failed".to_string(),
            details,
        }
    }
}

/// Render a wait time as "N minutes and M seconds".
pub fn format_wait(seconds: u64) -> String {
    fn unit(n: u64, singular: &str) -> String {
        if n == 1 {
            format!("1 {}", singular)
        } else {
            format!("{} {}s", n, singular)
        }
    }

    let minutes = seconds / 60;
    let rest = seconds % 60;
    match (minutes, rest) {
        (0, s) => unit(s, "second"),
        (m, 0) => unit(m, "minute"),
        (m, s) => format!("{} and {}", unit(m, "minute"), unit(s, "second")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(1), "1 second");
        assert_eq!(format_wait(45), "45 seconds");
        assert_eq!(format_wait(60), "1 minute");
        assert_eq!(format_wait(900), "15 minutes");
        assert_eq!(format_wait(252), "4 minutes and 12 seconds");
    }

    #[test]
    fn test_moderation_rate_limit_body_fails_open() {
        let body = serde_json::to_value(ModerationRateLimitError::new(120)).unwrap();
        assert_eq!(body["retry_after"], 120);
        assert_eq!(body["safe"], true);
        assert_eq!(body["blocked"], false);
        assert_eq!(body["issues"], serde_json::json!([]));
        assert_eq!(body["confidence"], 0.0);
        assert!(body["flag_type"].is_null());
        assert!(body["message"].as_str().unwrap().contains("2 minutes"));
    }

    #[test]
    fn test_verdict_shapes() {
        let blocked = ModerationVerdict::blocked("hate_speech");
        assert!(blocked.blocked && !blocked.safe);
        assert_eq!(blocked.confidence, 1.0);

        let safe = ModerationVerdict::safe();
        assert!(safe.safe && safe.issues.is_empty());

        let json = serde_json::to_value(&safe).unwrap();
        assert!(json.get("message").is_none());
        assert!(json["flag_type"].is_null());
    }

    #[test]
    fn test_rule_deserializes_with_default_is_regex() {
        let rule: ModerationRule =
            serde_json::from_str(r#"{"pattern":"spam","category":"spam","action":"flag"}"#).unwrap();
        assert!(!rule.is_regex);
        assert_eq!(rule.action, RuleAction::Flag);
    }

    #[test]
    fn test_auth_request_debug_redacts_password() {
        let request = AuthRequest {
            action: AuthAction::Signin,
            email: "a@b.co".to_string(),
            password: "hunter22hunter".to_string(),
        };
        assert!(!format!("{:?}", request).contains("hunter22"));
    }
}
