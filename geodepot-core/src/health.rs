//! Health check types for providers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Store is open and enumerable
    Healthy,
    /// Store is open but some datasets could not be indexed
    Degraded,
    /// Store failed to open or enumerate
    Unhealthy,
    /// Store has not been opened yet
    Unknown,
}

/// Health check result for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    /// Provider identifier
    pub component: String,
    pub message: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, component, None)
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, component, Some(message.into()))
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, component, Some(message.into()))
    }

    pub fn unknown(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unknown, component, Some(message.into()))
    }

    fn with_status(status: HealthStatus, component: impl Into<String>, message: Option<String>) -> Self {
        Self {
            status,
            component: component.into(),
            message,
            metadata: None,
        }
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_status() {
        assert_eq!(HealthCheck::healthy("p").status, HealthStatus::Healthy);
        assert_eq!(HealthCheck::degraded("p", "x").status, HealthStatus::Degraded);
        assert_eq!(HealthCheck::unhealthy("p", "x").status, HealthStatus::Unhealthy);
        assert_eq!(HealthCheck::unknown("p", "x").message.as_deref(), Some("x"));
    }

    #[test]
    fn test_with_metadata_accumulates() {
        let check = HealthCheck::healthy("p")
            .with_metadata("datasets", serde_json::json!(3))
            .with_metadata("kind", serde_json::json!("memory"));
        let metadata = check.metadata.unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata["datasets"], serde_json::json!(3));
    }
}
