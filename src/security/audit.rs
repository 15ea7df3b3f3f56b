//! Structured audit trail for every gateway decision point.
//!
//! Entries carry masked identifiers only:
//! - IPv4 keeps the first two octets (`203.0.xxx.xxx`)
//! - IPv6 keeps the first four groups (`2001:db8:85a3:0:xxxx:xxxx:xxxx:xxxx`)
//! - user ids keep their first 8 characters (`3f2504e0...`)
//!
//! Emitting never blocks the request: entries go through a bounded channel
//! to a background writer, and are dropped if it falls behind.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::Ipv6Addr;
use std::time::Instant;
use tokio::sync::mpsc;

const USER_ID_VISIBLE_CHARS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub level: AuditLevel,
    pub function_name: &'static str,
    pub action: String,
    pub client_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub metadata: Map<String, Value>,
}

impl AuditEntry {
    /// Start an entry; the client address is masked immediately
    pub fn new(function_name: &'static str, action: &str, client_ip: &str, started: Instant) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            level: AuditLevel::Info,
            function_name,
            action: action.to_string(),
            client_ip: mask_ip(client_ip),
            user_id: None,
            success: true,
            duration_ms: started.elapsed().as_millis() as u64,
            metadata: Map::new(),
        }
    }

    pub fn level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(mask_user_id(user_id));
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Fire-and-forget handle to the audit writer
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditLogger {
    /// Start the background writer that prints entries on the `audit` target
    pub fn spawn(capacity: usize) -> Self {
        let (logger, mut rx) = Self::with_receiver(capacity);
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                write_entry(&entry);
            }
        });
        logger
    }

    /// Create a logger whose entries are delivered to the returned receiver
    pub fn with_receiver(capacity: usize) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn emit(&self, entry: AuditEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tracing::warn!(action = %entry.action, "Audit channel full, dropping entry");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Audit writer stopped, dropping entry");
            }
        }
    }
}

fn write_entry(entry: &AuditEntry) {
    let json = entry.to_json();
    match entry.level {
        AuditLevel::Info => tracing::info!(target: "audit", "{}", json),
        AuditLevel::Warn => tracing::warn!(target: "audit", "{}", json),
        AuditLevel::Error => tracing::error!(target: "audit", "{}", json),
    }
}

/// Mask an IP address for logging. Idempotent on already-masked values.
pub fn mask_ip(ip: &str) -> String {
    let ip = ip.trim();

    if let Ok(v6) = ip.trim_start_matches('[').trim_end_matches(']').parse::<Ipv6Addr>() {
        if let Some(v4) = v6.to_ipv4_mapped() {
            return mask_ip(&v4.to_string());
        }
        let groups: Vec<String> = v6.segments()[..4].iter().map(|s| format!("{:x}", s)).collect();
        return format!("{}:xxxx:xxxx:xxxx:xxxx", groups.join(":"));
    }

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() == 4 {
        return format!("{}.{}.xxx.xxx", octets[0], octets[1]);
    }

    let groups: Vec<&str> = ip.split(':').collect();
    if groups.len() >= 5 {
        return format!("{}:xxxx:xxxx:xxxx:xxxx", groups[..4].join(":"));
    }

    "unknown".to_string()
}

/// Keep the first 8 characters of a user id
pub fn mask_user_id(user_id: &str) -> String {
    let prefix: String = user_id.chars().take(USER_ID_VISIBLE_CHARS).collect();
    format!("{}...", prefix.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_ipv4() {
        assert_eq!(mask_ip("203.0.113.42"), "203.0.xxx.xxx");
        assert_eq!(mask_ip("10.1.2.3"), "10.1.xxx.xxx");
    }

    #[test]
    fn test_mask_ipv4_is_idempotent() {
        let once = mask_ip("203.0.113.42");
        assert_eq!(mask_ip(&once), once);
    }

    #[test]
    fn test_mask_ipv6() {
        assert_eq!(
            mask_ip("2001:0db8:85a3:0000:0000:8a2e:0370:7334"),
            "2001:db8:85a3:0:xxxx:xxxx:xxxx:xxxx"
        );
        assert_eq!(mask_ip("2001:db8::1"), "2001:db8:0:0:xxxx:xxxx:xxxx:xxxx");
        assert_eq!(mask_ip("::ffff:198.51.100.7"), "198.51.xxx.xxx");
    }

    #[test]
    fn test_mask_ipv6_is_idempotent() {
        let once = mask_ip("2001:db8:85a3::8a2e:370:7334");
        assert_eq!(mask_ip(&once), once);
    }

    #[test]
    fn test_mask_unknown() {
        assert_eq!(mask_ip("unknown"), "unknown");
        assert_eq!(mask_ip(""), "unknown");
    }

    #[test]
    fn test_mask_user_id() {
        assert_eq!(mask_user_id("3f2504e0-4f89-11d3-9a0c-0305e82c3301"), "3f2504e0...");
        assert_eq!(mask_user_id("abc"), "abc...");
        let once = mask_user_id("3f2504e0-4f89");
        assert_eq!(mask_user_id(&once), once);
    }

    #[test]
    fn test_entry_serialization() {
        let entry = AuditEntry::new("moderate-content", "blocked", "203.0.113.42", Instant::now())
            .level(AuditLevel::Warn)
            .success(false)
            .user_id("3f2504e0-4f89-11d3-9a0c-0305e82c3301")
            .meta("content_type", "comment");

        let json: Value = serde_json::from_str(&entry.to_json()).unwrap();
        assert_eq!(json["function_name"], "moderate-content");
        assert_eq!(json["action"], "blocked");
        assert_eq!(json["client_ip"], "203.0.xxx.xxx");
        assert_eq!(json["user_id"], "3f2504e0...");
        assert_eq!(json["level"], "warn");
        assert_eq!(json["success"], false);
        assert_eq!(json["metadata"]["content_type"], "comment");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_emit_delivers_and_never_blocks() {
        let (logger, mut rx) = AuditLogger::with_receiver(1);

        logger.emit(AuditEntry::new("auth-gateway", "success", "10.0.0.1", Instant::now()));
        // Channel is full; this one is dropped instead of waiting.
        logger.emit(AuditEntry::new("auth-gateway", "dropped", "10.0.0.1", Instant::now()));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.action, "success");
        assert!(rx.try_recv().is_err());

        drop(rx);
        logger.emit(AuditEntry::new("auth-gateway", "closed", "10.0.0.1", Instant::now()));
    }
}
