use std::env;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::security::rate_limiter::RateLimitPolicy;

const DEFAULT_SERVER_SECRET: &str = "change-this-secret-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Clone)]
pub struct ClassifierConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct AuthProviderConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Runtime configuration, read from the environment after `.env` is loaded.
#[derive(Clone)]
pub struct Config {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub server_secret: String,
    pub classifier: ClassifierConfig,
    pub auth_provider: AuthProviderConfig,
    pub rules_file: Option<String>,
    pub auth_policy: RateLimitPolicy,
    pub moderation_policy: RateLimitPolicy,
    pub request_timeout: Duration,
    /// Budget for a single counter store, rule or flag call
    pub store_timeout: Duration,
    /// Reverse proxies whose forwarding headers are believed; empty means none
    pub trusted_proxies: Vec<IpAddr>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("redis") | Err(_) => StoreBackend::Redis,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let server_secret = env::var("SERVER_SECRET").unwrap_or_else(|_| {
            tracing::warn!("SERVER_SECRET not set, using default (NOT SECURE for production)");
            DEFAULT_SERVER_SECRET.to_string()
        });

        let classifier = ClassifierConfig {
            url: env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            api_key: env::var("CLASSIFIER_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|key| !key.is_empty()),
            model: env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            timeout: Duration::from_millis(parse_var("CLASSIFIER_TIMEOUT_MS", 8_000)?),
        };

        let auth_provider = AuthProviderConfig {
            url: env::var("AUTH_PROVIDER_URL").ok(),
            api_key: env::var("AUTH_PROVIDER_KEY").ok(),
            timeout: Duration::from_secs(10),
        };

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
            store_backend,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            server_secret,
            classifier,
            auth_provider,
            rules_file: env::var("MODERATION_RULES_FILE").ok(),
            auth_policy: RateLimitPolicy::new(
                parse_var("AUTH_MAX_ATTEMPTS", 5)?,
                Duration::from_secs(parse_var("AUTH_WINDOW_SECS", 900)?),
            ),
            moderation_policy: RateLimitPolicy::new(
                parse_var("MODERATION_MAX_ATTEMPTS", 30)?,
                Duration::from_secs(parse_var("MODERATION_WINDOW_SECS", 300)?),
            ),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 30)?),
            store_timeout: Duration::from_millis(parse_var("STORE_TIMEOUT_MS", 1_000)?),
            trusted_proxies: parse_ip_list("TRUSTED_PROXIES", &env::var("TRUSTED_PROXIES").unwrap_or_default())?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Invalid { key, value })
        }
        Err(_) => Ok(default),
    }
}

/// Comma-separated IP addresses; blank entries are ignored
fn parse_ip_list(key: &'static str, value: &str) -> Result<Vec<IpAddr>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry.parse::<IpAddr>().map_err(|_| ConfigError::Invalid {
                key,
                value: entry.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default_and_invalid() {
        assert_eq!(parse_var::<u64>("REELGUARD_TEST_UNSET_VAR", 7).unwrap(), 7);

        env::set_var("REELGUARD_TEST_BAD_NUMBER", "five");
        let err = parse_var::<u32>("REELGUARD_TEST_BAD_NUMBER", 5).unwrap_err();
        assert!(err.to_string().contains("REELGUARD_TEST_BAD_NUMBER"));

        env::set_var("REELGUARD_TEST_GOOD_NUMBER", " 12 ");
        assert_eq!(parse_var::<u32>("REELGUARD_TEST_GOOD_NUMBER", 5).unwrap(), 12);
    }

    #[test]
    fn test_parse_trusted_proxies() {
        assert!(parse_ip_list("TRUSTED_PROXIES", "").unwrap().is_empty());

        let proxies = parse_ip_list("TRUSTED_PROXIES", "10.0.0.1, ::1,").unwrap();
        assert_eq!(proxies, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);

        let err = parse_ip_list("TRUSTED_PROXIES", "10.0.0.1,10.0.0.0/8").unwrap_err();
        assert!(err.to_string().contains("10.0.0.0/8"));
    }
}
