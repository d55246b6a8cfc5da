//! DCP client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level DCP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DcpConfig {
    /// Deadline for the first cluster config snapshot after connect.
    pub connection_timeout: Duration,

    /// Rollback mitigation settings.
    pub rollback_mitigation: RollbackMitigationConfig,
}

impl Default for DcpConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            rollback_mitigation: RollbackMitigationConfig::default(),
        }
    }
}

/// Rollback mitigation settings.
///
/// When `enabled` is false the subsystem is not instantiated and the stream
/// checkpoints against the replica-unaware sequence numbers instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackMitigationConfig {
    /// Whether rollback mitigation runs at all.
    pub enabled: bool,

    /// Period of the persisted-seqno observe fan-out.
    pub interval: Duration,

    /// Period of the cluster topology poll.
    pub config_watch_interval: Duration,
}

impl Default for RollbackMitigationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(200),
            config_watch_interval: Duration::from_secs(2),
        }
    }
}

impl DcpConfig {
    /// Create a configuration builder.
    pub fn builder() -> DcpConfigBuilder {
        DcpConfigBuilder::default()
    }
}

/// Builder for [`DcpConfig`].
#[derive(Debug, Default)]
pub struct DcpConfigBuilder {
    config: DcpConfig,
}

impl DcpConfigBuilder {
    /// Set the first-config deadline.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Enable or disable rollback mitigation.
    pub fn rollback_mitigation_enabled(mut self, enabled: bool) -> Self {
        self.config.rollback_mitigation.enabled = enabled;
        self
    }

    /// Set the observe fan-out period.
    pub fn rollback_mitigation_interval(mut self, interval: Duration) -> Self {
        self.config.rollback_mitigation.interval = interval;
        self
    }

    /// Set the topology poll period.
    pub fn config_watch_interval(mut self, interval: Duration) -> Self {
        self.config.rollback_mitigation.config_watch_interval = interval;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> DcpConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DcpConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert!(config.rollback_mitigation.enabled);
        assert_eq!(
            config.rollback_mitigation.interval,
            Duration::from_millis(200)
        );
        assert_eq!(
            config.rollback_mitigation.config_watch_interval,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn builder_overrides() {
        let config = DcpConfig::builder()
            .connection_timeout(Duration::from_secs(30))
            .rollback_mitigation_enabled(false)
            .rollback_mitigation_interval(Duration::from_secs(1))
            .config_watch_interval(Duration::from_secs(10))
            .build();

        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert!(!config.rollback_mitigation.enabled);
        assert_eq!(config.rollback_mitigation.interval, Duration::from_secs(1));
        assert_eq!(
            config.rollback_mitigation.config_watch_interval,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: DcpConfig = serde_json::from_str(
            r#"{"rollback_mitigation": {"enabled": false}}"#,
        )
        .unwrap();

        assert!(!config.rollback_mitigation.enabled);
        assert_eq!(
            config.rollback_mitigation.interval,
            Duration::from_millis(200)
        );
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }
}
