use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AuthProviderConfig;
use crate::models::{AuthAction, AuthRequest, AuthSession};
use crate::security::rate_limiter::{RateLimitPolicy, RateLimitType, RateLimiter};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("request rejected by identity provider: {0}")]
    Rejected(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Identity backend that actually checks credentials and creates accounts
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;
}

/// GoTrue-style password authentication over HTTP
#[derive(Clone)]
pub struct HttpAuthProvider {
    base_url: Option<String>,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpAuthProvider {
    pub fn new(config: &AuthProviderConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;

        if config.url.is_none() {
            tracing::warn!("AUTH_PROVIDER_URL not set; /auth will answer 500");
        }

        Ok(Self {
            base_url: config.url.as_ref().map(|url| url.trim_end_matches('/').to_string()),
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    async fn post(&self, path: &str, email: &str, password: &str) -> Result<(reqwest::StatusCode, Value), AuthError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| AuthError::Unavailable(anyhow::anyhow!("identity provider not configured")))?;

        let mut request = self
            .http_client
            .post(format!("{}{}", base_url, path))
            .json(&serde_json::json!({ "email": email, "password": password }));
        if let Some(key) = self.api_key.as_deref() {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.into()))?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let (status, body) = self.post("/token?grant_type=password", email, password).await?;

        if status.is_success() {
            return Ok(split_session(body));
        }
        if status.is_client_error() {
            return Err(AuthError::InvalidCredentials);
        }
        Err(AuthError::Unavailable(anyhow::anyhow!("sign-in returned {}", status)))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let (status, body) = self.post("/signup", email, password).await?;

        if status.is_success() {
            return Ok(split_session(body));
        }
        if status.is_client_error() {
            let reason = body
                .get("msg")
                .or_else(|| body.get("error_description"))
                .and_then(Value::as_str)
                .unwrap_or("sign-up rejected")
                .to_string();
            return Err(AuthError::Rejected(reason));
        }
        Err(AuthError::Unavailable(anyhow::anyhow!("sign-up returned {}", status)))
    }
}

/// Split a provider response into the user record and the session tokens.
/// Sign-ups awaiting email confirmation return a bare user and no session.
fn split_session(body: Value) -> AuthSession {
    match body {
        Value::Object(mut map) => {
            if let Some(user) = map.remove("user") {
                let session = if map.contains_key("access_token") {
                    Value::Object(map)
                } else {
                    Value::Null
                };
                AuthSession { user, session }
            } else {
                AuthSession {
                    user: Value::Object(map),
                    session: Value::Null,
                }
            }
        }
        other => AuthSession {
            user: other,
            session: Value::Null,
        },
    }
}

#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(AuthSession),
    RateLimited { retry_after: u64 },
}

#[derive(Debug, Error)]
pub enum AuthGatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The counter store could not be reached; sign-in is refused rather than unthrottled
    #[error("rate limit store unavailable: {0}")]
    LimiterUnavailable(#[source] anyhow::Error),
}

/// Throttled front door for sign-in and sign-up
#[derive(Clone)]
pub struct AuthGateway {
    limiter: RateLimiter,
    policy: RateLimitPolicy,
    provider: Arc<dyn AuthProvider>,
}

impl AuthGateway {
    pub fn new(limiter: RateLimiter, policy: RateLimitPolicy, provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            limiter,
            policy,
            provider,
        }
    }

    /// Count the attempt, then hand the credentials to the provider.
    ///
    /// Only called with an already validated request, so malformed input never
    /// consumes budget. Failed credentials keep counting; a successful sign-in
    /// clears the window.
    pub async fn authenticate(
        &self,
        client_key: &str,
        request: &AuthRequest,
    ) -> Result<AuthOutcome, AuthGatewayError> {
        let limit = self
            .limiter
            .check_rate_limit(client_key, RateLimitType::Auth, self.policy)
            .await
            .map_err(|e| {
                metrics::counter!("rate_limit_store_errors_total", 1, "action" => "auth");
                AuthGatewayError::LimiterUnavailable(e)
            })?;

        if !limit.allowed {
            return Ok(AuthOutcome::RateLimited {
                retry_after: limit.retry_after,
            });
        }
        tracing::debug!(attempts = limit.attempts, remaining = limit.remaining, "Auth attempt counted");

        let result = match request.action {
            AuthAction::Signin => self.provider.sign_in(&request.email, &request.password).await,
            AuthAction::Signup => self.provider.sign_up(&request.email, &request.password).await,
        };

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("auth_attempts_total", 1, "action" => request.action.as_str(), "outcome" => outcome);
        let session = result?;

        if request.action == AuthAction::Signin {
            if let Err(e) = self.limiter.clear(client_key, RateLimitType::Auth).await {
                tracing::error!(error = %e, "Failed to clear auth rate limit after successful sign-in");
            }
        }

        Ok(AuthOutcome::Authenticated(session))
    }
}
