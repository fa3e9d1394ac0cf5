//! Boot configuration.
//!
//! A single JSON document names the initial shard endpoints, the table →
//! shard-key map, the scaling policy, launcher parameters, and listen
//! ports. Loading validates the document and fills defaults for every
//! optional section; an invalid document is a fatal boot error.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ScalingMode;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Scaling policy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScalingThresholds {
    #[serde(default)]
    pub cpu_threshold_percent: f64,
    #[serde(default)]
    pub memory_threshold_percent: f64,
    #[serde(default)]
    pub connection_threshold: i64,
    #[serde(default)]
    pub qps_threshold: f64,
    #[serde(default)]
    pub total_entry_threshold_per_shard: i64,
}

/// Credentials used for shard databases (initial and provisioned).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub root_password: String,
}

/// Parameters for the container-based shard launcher.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DockerConfig {
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub container_prefix: String,
}

/// Listen ports and the base port for provisioned shards.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortsConfig {
    #[serde(default)]
    pub base_port: u16,
    #[serde(default)]
    pub query_router_port: u16,
    #[serde(default)]
    pub coordinator_port: u16,
}

/// Hard limits on scaling and provisioning retries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LimitsConfig {
    #[serde(default)]
    pub max_shards: usize,
    #[serde(default)]
    pub max_connection_attempts: u32,
    #[serde(default)]
    pub connection_retry_interval_seconds: u64,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Initial shards: id → MySQL connection URL.
    pub shards: HashMap<String, String>,
    /// Table name → shard-key column. Tables absent here have no shard key.
    pub table_shard_keys: HashMap<String, String>,
    #[serde(default)]
    pub scaling_thresholds: ScalingThresholds,
    pub scaling_strategy: ScalingMode,
    #[serde(default)]
    pub monitoring_interval_seconds: u64,
    /// Suppress policy firings for this long after a provisioning action
    /// terminates. Zero disables the cooldown.
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub ports: PortsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from a JSON file, validate it, and fill defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse configuration from a JSON string, validate, and fill defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.shards.is_empty() {
            return Err(ConfigError::Invalid("no shards configured".to_string()));
        }
        if self.table_shard_keys.is_empty() {
            return Err(ConfigError::Invalid(
                "no table shard keys configured".to_string(),
            ));
        }

        let cpu = self.scaling_thresholds.cpu_threshold_percent;
        if cpu <= 0.0 || cpu > 100.0 {
            return Err(ConfigError::Invalid(
                "cpu threshold must be between 0 and 100".to_string(),
            ));
        }
        if self.scaling_thresholds.total_entry_threshold_per_shard <= 0 {
            return Err(ConfigError::Invalid(
                "total entry threshold must be positive".to_string(),
            ));
        }

        if self.monitoring_interval_seconds == 0 {
            self.monitoring_interval_seconds = 60;
        }

        // Defaults for optional sections.
        if self.database.username.is_empty() {
            self.database.username = "testuser".to_string();
        }
        if self.database.password.is_empty() {
            self.database.password = "testpass".to_string();
        }
        if self.database.root_password.is_empty() {
            self.database.root_password = "rootpass".to_string();
        }
        if self.docker.network_name.is_empty() {
            self.docker.network_name = "shardgrid-network".to_string();
        }
        if self.docker.image.is_empty() {
            self.docker.image = "mysql:8.0".to_string();
        }
        if self.docker.container_prefix.is_empty() {
            self.docker.container_prefix = "mysql".to_string();
        }
        if self.ports.base_port == 0 {
            self.ports.base_port = 3306;
        }
        if self.ports.query_router_port == 0 {
            self.ports.query_router_port = 8080;
        }
        if self.ports.coordinator_port == 0 {
            self.ports.coordinator_port = 9090;
        }
        if self.limits.max_shards == 0 {
            self.limits.max_shards = 5;
        }
        if self.limits.max_connection_attempts == 0 {
            self.limits.max_connection_attempts = 30;
        }
        if self.limits.connection_retry_interval_seconds == 0 {
            self.limits.connection_retry_interval_seconds = 2;
        }
        if self.scaling_thresholds.memory_threshold_percent == 0.0 {
            self.scaling_thresholds.memory_threshold_percent = 85.0;
        }
        if self.scaling_thresholds.connection_threshold == 0 {
            self.scaling_thresholds.connection_threshold = 20;
        }
        if self.scaling_thresholds.qps_threshold == 0.0 {
            self.scaling_thresholds.qps_threshold = 1000.0;
        }

        Ok(())
    }

    /// All configured table names, for schema seeding and row counting.
    pub fn table_names(&self) -> Vec<String> {
        self.table_shard_keys.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        r#"{
            "shards": {"shard-1": "mysql://u:p@127.0.0.1:3306/shard1_db"},
            "table_shard_keys": {"users": "user_id"},
            "scaling_thresholds": {
                "cpu_threshold_percent": 80.0,
                "total_entry_threshold_per_shard": 100
            },
            "scaling_strategy": "hot"
        }"#
        .to_string()
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let config = Config::from_json(&minimal_json()).unwrap();
        assert_eq!(config.monitoring_interval_seconds, 60);
        assert_eq!(config.ports.base_port, 3306);
        assert_eq!(config.ports.query_router_port, 8080);
        assert_eq!(config.ports.coordinator_port, 9090);
        assert_eq!(config.limits.max_shards, 5);
        assert_eq!(config.limits.max_connection_attempts, 30);
        assert_eq!(config.docker.image, "mysql:8.0");
        assert_eq!(config.database.username, "testuser");
        assert_eq!(config.scaling_thresholds.memory_threshold_percent, 85.0);
        assert_eq!(config.scaling_thresholds.qps_threshold, 1000.0);
        assert_eq!(config.cooldown_seconds, 0);
    }

    #[test]
    fn rejects_empty_shards() {
        let raw = minimal_json().replace(
            r#""shards": {"shard-1": "mysql://u:p@127.0.0.1:3306/shard1_db"}"#,
            r#""shards": {}"#,
        );
        assert!(matches!(
            Config::from_json(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_missing_shard_keys() {
        let raw = minimal_json().replace(
            r#""table_shard_keys": {"users": "user_id"}"#,
            r#""table_shard_keys": {}"#,
        );
        assert!(matches!(
            Config::from_json(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_strategy() {
        let raw = minimal_json().replace("\"hot\"", "\"lukewarm\"");
        assert!(matches!(Config::from_json(&raw), Err(ConfigError::Decode(_))));
    }

    #[test]
    fn rejects_out_of_range_cpu_threshold() {
        let raw = minimal_json().replace("80.0", "250.0");
        assert!(matches!(
            Config::from_json(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_nonpositive_entry_threshold() {
        let raw = minimal_json().replace(
            "\"total_entry_threshold_per_shard\": 100",
            "\"total_entry_threshold_per_shard\": 0",
        );
        assert!(matches!(
            Config::from_json(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn table_names_come_from_key_map() {
        let config = Config::from_json(&minimal_json()).unwrap();
        assert_eq!(config.table_names(), vec!["users".to_string()]);
    }
}
