use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    AuthAction, AuthRequest, ContentType, ModerationRequest, RawAuthRequest, RawModerationRequest,
};

pub const MAX_CONTENT_CHARS: usize = 10_000;
pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 128;
const MAX_EMAIL_CHARS: usize = 254;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// Validate a moderation request. Every field problem is reported, not just the first.
pub fn validate_moderation(raw: RawModerationRequest) -> Result<ModerationRequest, Vec<String>> {
    let mut details = Vec::new();

    let content = match raw.content {
        Some(content) if content.trim().is_empty() => {
            details.push("content must not be empty".to_string());
            None
        }
        Some(content) if content.chars().count() > MAX_CONTENT_CHARS => {
            details.push(format!(
                "content must be at most {} characters",
                MAX_CONTENT_CHARS
            ));
            None
        }
        Some(content) => Some(content),
        None => {
            details.push("content is required".to_string());
            None
        }
    };

    let content_type = match raw.content_type.as_deref() {
        Some(value) => {
            let parsed = ContentType::parse(value);
            if parsed.is_none() {
                details.push("content_type must be one of: video, comment".to_string());
            }
            parsed
        }
        None => {
            details.push("content_type is required".to_string());
            None
        }
    };

    let content_id = match raw.content_id {
        Some(id) if is_hyphenated_uuid(&id) => Some(id),
        Some(_) => {
            details.push("content_id must be a valid UUID".to_string());
            None
        }
        None => {
            details.push("content_id is required".to_string());
            None
        }
    };

    match (content, content_type, content_id) {
        (Some(content), Some(content_type), Some(content_id)) if details.is_empty() => {
            Ok(ModerationRequest {
                content,
                content_type,
                content_id,
            })
        }
        _ => Err(details),
    }
}

/// Validate a sign-in/sign-up request before it can consume rate-limit budget.
pub fn validate_auth(raw: RawAuthRequest) -> Result<AuthRequest, Vec<String>> {
    let mut details = Vec::new();

    let action = match raw.action.as_deref() {
        Some("signin") => Some(AuthAction::Signin),
        Some("signup") => Some(AuthAction::Signup),
        Some(_) => {
            details.push("action must be one of: signin, signup".to_string());
            None
        }
        None => {
            details.push("action is required".to_string());
            None
        }
    };

    let email = match raw.email {
        Some(email) => {
            let email = email.trim().to_string();
            if email.chars().count() > MAX_EMAIL_CHARS || !EMAIL_REGEX.is_match(&email) {
                details.push("email must be a valid email address".to_string());
                None
            } else {
                Some(email)
            }
        }
        None => {
            details.push("email is required".to_string());
            None
        }
    };

    let password = match raw.password {
        Some(password) => {
            let len = password.chars().count();
            if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&len) {
                details.push(format!(
                    "password must be between {} and {} characters",
                    MIN_PASSWORD_CHARS, MAX_PASSWORD_CHARS
                ));
                None
            } else {
                Some(password)
            }
        }
        None => {
            details.push("password is required".to_string());
            None
        }
    };

    match (action, email, password) {
        (Some(action), Some(email), Some(password)) if details.is_empty() => Ok(AuthRequest {
            action,
            email,
            password,
        }),
        _ => Err(details),
    }
}

/// Only the canonical 8-4-4-4-12 form; braced, urn and simple forms are refused.
fn is_hyphenated_uuid(id: &str) -> bool {
    id.len() == uuid::fmt::Hyphenated::LENGTH && uuid::Uuid::parse_str(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";

    fn moderation(content: &str, content_type: &str, content_id: &str) -> RawModerationRequest {
        RawModerationRequest {
            content: Some(content.to_string()),
            content_type: Some(content_type.to_string()),
            content_id: Some(content_id.to_string()),
        }
    }

    #[test]
    fn test_valid_moderation_request() {
        let request = validate_moderation(moderation("nice clip", "video", ID)).unwrap();
        assert_eq!(request.content_type, ContentType::Video);
        assert_eq!(request.content_id, ID);
    }

    #[test]
    fn test_moderation_collects_all_errors() {
        let details = validate_moderation(moderation("   ", "story", "42")).unwrap_err();
        assert_eq!(details.len(), 3);
        assert!(details.iter().any(|d| d.contains("content must not be empty")));
        assert!(details.iter().any(|d| d.contains("content_type")));
        assert!(details.iter().any(|d| d.contains("content_id")));
    }

    #[test]
    fn test_content_id_must_be_hyphenated() {
        for id in [
            "3f2504e04f8911d39a0c0305e82c3301",
            "{3f2504e0-4f89-11d3-9a0c-0305e82c3301}",
            "urn:uuid:3f2504e0-4f89-11d3-9a0c-0305e82c3301",
        ] {
            let details = validate_moderation(moderation("nice clip", "video", id)).unwrap_err();
            assert_eq!(details, vec!["content_id must be a valid UUID".to_string()]);
        }
        assert!(validate_moderation(moderation("nice clip", "video", &ID.to_uppercase())).is_ok());
    }

    #[test]
    fn test_moderation_missing_fields() {
        let details = validate_moderation(RawModerationRequest::default()).unwrap_err();
        assert_eq!(details.len(), 3);
    }

    #[test]
    fn test_content_length_counts_characters() {
        let at_limit = "é".repeat(MAX_CONTENT_CHARS);
        assert!(validate_moderation(moderation(&at_limit, "comment", ID)).is_ok());

        let over = "a".repeat(MAX_CONTENT_CHARS + 1);
        let details = validate_moderation(moderation(&over, "comment", ID)).unwrap_err();
        assert_eq!(details, vec!["content must be at most 10000 characters".to_string()]);
    }

    fn auth(action: &str, email: &str, password: &str) -> RawAuthRequest {
        RawAuthRequest {
            action: Some(action.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[test]
    fn test_valid_auth_request() {
        let request = validate_auth(auth("signin", " user@example.com ", "correct-horse")).unwrap();
        assert_eq!(request.action, AuthAction::Signin);
        assert_eq!(request.email, "user@example.com");
    }

    #[test]
    fn test_auth_password_bounds() {
        assert!(validate_auth(auth("signup", "a@b.co", "1234567")).is_err());
        assert!(validate_auth(auth("signup", "a@b.co", "12345678")).is_ok());
        assert!(validate_auth(auth("signup", "a@b.co", &"x".repeat(128))).is_ok());
        assert!(validate_auth(auth("signup", "a@b.co", &"x".repeat(129))).is_err());
    }

    #[test]
    fn test_auth_rejects_bad_email_and_action() {
        let details = validate_auth(auth("login", "not-an-email", "password123")).unwrap_err();
        assert_eq!(details.len(), 2);
    }
}
