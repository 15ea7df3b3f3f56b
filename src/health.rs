use serde::Serialize;

use crate::security::CounterStore;

/// Health check status for the gateway
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub store_connected: bool,
    pub timestamp: i64,
}

impl HealthStatus {
    /// The gateway is healthy when its counter store answers.
    /// Classifier and identity provider outages degrade requests, not health.
    pub async fn check(store: &dyn CounterStore) -> Self {
        let store_connected = match store.ping().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(error = %e, "Counter store ping failed");
                false
            }
        };

        Self {
            healthy: store_connected,
            store_connected,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}
