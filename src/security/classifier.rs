use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ClassifierConfig;
use crate::models::ContentType;

/// Categories the classifier is asked to report
pub const CATEGORIES: &[&str] = &[
    "hate_speech",
    "harassment",
    "spam",
    "violence",
    "adult_content",
    "misinformation",
];

/// Structured verdict returned by the external classifier
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiVerdict {
    pub safe: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub primary_issue: Option<String>,
}

/// External text classifier.
///
/// `None` means "no opinion": the classifier was disabled, timed out, failed or
/// answered with something unparseable. Callers treat it as safe with zero
/// confidence and never surface it as an error.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, content_type: ContentType) -> Option<AiVerdict>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct HttpClassifier {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;

        if config.api_key.is_none() {
            tracing::warn!("No classifier API key configured; AI moderation disabled");
        }

        Ok(Self {
            endpoint: config.url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.timeout,
            http_client,
        })
    }

    async fn request_verdict(&self, api_key: &str, text: &str, content_type: ContentType) -> Option<AiVerdict> {
        let request_body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system_prompt() },
                {
                    "role": "user",
                    "content": format!("Content type: {}\n\nContent:\n{}", content_type, text)
                }
            ]
        });

        let response = match self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Classifier request failed");
                metrics::counter!("classifier_calls_total", 1, "outcome" => "transport_error");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Classifier returned an error status");
            metrics::counter!("classifier_calls_total", 1, "outcome" => "http_error");
            return None;
        }

        let completion = match response.json::<ChatCompletionResponse>().await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode classifier response");
                metrics::counter!("classifier_calls_total", 1, "outcome" => "parse_error");
                return None;
            }
        };

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        let verdict = extract_verdict(&text);
        let outcome = if verdict.is_some() { "ok" } else { "parse_error" };
        metrics::counter!("classifier_calls_total", 1, "outcome" => outcome);
        verdict
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str, content_type: ContentType) -> Option<AiVerdict> {
        let api_key = match self.api_key.as_deref() {
            Some(key) => key,
            None => return None,
        };

        match tokio::time::timeout(self.timeout, self.request_verdict(api_key, text, content_type)).await {
            Ok(verdict) => verdict,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Classifier call timed out");
                metrics::counter!("classifier_calls_total", 1, "outcome" => "timeout");
                None
            }
        }
    }
}

fn system_prompt() -> String {
    format!(
        "You are a content moderator for a short-video social platform. \
         Analyze the user-submitted text for the following categories: {}. \
         Respond ONLY with a JSON object of the form \
         {{\"safe\": boolean, \"issues\": [category, ...], \"confidence\": number between 0 and 1, \
         \"primary_issue\": category or null}}. \
         Use an empty issues list and a null primary_issue when the content is safe.",
        CATEGORIES.join(", ")
    )
}

/// Find the first JSON object in `text` that reads as a verdict
///
/// Models often wrap the payload in prose or code fences, so every `{` is tried
/// as a starting point until one deserializes.
pub fn extract_verdict(text: &str) -> Option<AiVerdict> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            serde_json::Deserializer::from_str(&text[start..])
                .into_iter::<AiVerdict>()
                .next()
                .and_then(|parsed| parsed.ok())
        })
        .map(|mut verdict| {
            verdict.confidence = if verdict.confidence.is_finite() {
                verdict.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            verdict
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, api_key: Option<&str>, timeout: Duration) -> ClassifierConfig {
        ClassifierConfig {
            url: url.to_string(),
            api_key: api_key.map(str::to_string),
            model: "test-model".to_string(),
            timeout,
        }
    }

    #[test]
    fn test_extract_plain_json() {
        let verdict = extract_verdict(
            r#"{"safe": false, "issues": ["spam"], "confidence": 0.92, "primary_issue": "spam"}"#,
        )
        .unwrap();
        assert!(!verdict.safe);
        assert_eq!(verdict.issues, vec!["spam".to_string()]);
        assert_eq!(verdict.primary_issue.as_deref(), Some("spam"));
    }

    #[test]
    fn test_extract_json_wrapped_in_prose() {
        let text = "Sure! Here is my analysis:\n```json\n{\"safe\": true, \"issues\": [], \"confidence\": 0.1, \"primary_issue\": null}\n```\nLet me know {if} you need more.";
        let verdict = extract_verdict(text).unwrap();
        assert!(verdict.safe);
        assert!(verdict.primary_issue.is_none());
    }

    #[test]
    fn test_extract_skips_non_verdict_objects() {
        let text = r#"{"note": "ignore"} then {"safe": false, "issues": ["violence"], "confidence": 0.8, "primary_issue": "violence"}"#;
        let verdict = extract_verdict(text).unwrap();
        assert_eq!(verdict.primary_issue.as_deref(), Some("violence"));
    }

    #[test]
    fn test_extract_clamps_confidence() {
        let verdict = extract_verdict(r#"{"safe": false, "confidence": 7.5}"#).unwrap();
        assert_eq!(verdict.confidence, 1.0);
        assert!(verdict.issues.is_empty());
    }

    #[test]
    fn test_extract_unparseable() {
        assert!(extract_verdict("I cannot help with that.").is_none());
        assert!(extract_verdict("{ broken json").is_none());
        assert!(extract_verdict("").is_none());
    }

    #[test]
    fn test_prompt_lists_taxonomy() {
        let prompt = system_prompt();
        for category in CATEGORIES {
            assert!(prompt.contains(category));
        }
    }

    #[tokio::test]
    async fn test_disabled_classifier_has_no_opinion() {
        let classifier = HttpClassifier::new(&config("http://127.0.0.1:9", None, Duration::from_secs(1))).unwrap();
        assert!(classifier.classify("anything", ContentType::Comment).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_classifier_has_no_opinion() {
        let classifier = HttpClassifier::new(&config(
            "http://127.0.0.1:9/v1/chat/completions",
            Some("key"),
            Duration::from_millis(500),
        ))
        .unwrap();
        assert!(classifier.classify("anything", ContentType::Video).await.is_none());
    }
}
