//! Configuration management for the relay application.
//!
//! This module handles loading, validation, and conversion of relay
//! configuration from TOML files and command-line arguments.

use relay_server::{
    ClusterConfig, DeliveryConfig, HeartbeatConfig, NodeAddr, OverflowPolicy, RelayConfig,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket listener settings
    pub server: ServerSettings,
    /// Identity of this node inside the cluster
    pub node: NodeSettings,
    /// Heartbeat timing
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    /// Local delivery queue settings
    #[serde(default)]
    pub delivery: DeliverySettings,
    /// Cluster settings
    #[serde(default)]
    pub cluster: ClusterSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the listener to (e.g., "127.0.0.1:7800")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Node identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Host other nodes use to reach this one; sealed into client identifiers
    pub advertise_host: String,
    /// Inter-node port advertised alongside `advertise_host`
    pub advertise_port: u16,
    /// Shared secret for sealing client identifiers; identical on every node
    pub crypto_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// `block` or `reject`
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

/// Cluster settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Whether this node shares state with other nodes
    #[serde(default)]
    pub enabled: bool,
    /// Cluster backend implementation; only `memory` is built in
    #[serde(default = "default_cluster_backend")]
    pub backend: String,
    #[serde(default = "default_group_client_limit")]
    pub group_client_limit: usize,
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_secs: u64,
    #[serde(default = "default_fanout_topic")]
    pub fanout_topic: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    8192
}

fn default_heartbeat_interval() -> u64 {
    25
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    10
}

fn default_write_timeout() -> u64 {
    10
}

fn default_cluster_backend() -> String {
    "memory".to_string()
}

fn default_group_client_limit() -> usize {
    1000
}

fn default_presence_ttl() -> u64 {
    86_400
}

fn default_fanout_topic() -> String {
    ClusterConfig::default().fanout_topic
}

fn default_service_name() -> String {
    ClusterConfig::default().service_name
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: default_cluster_backend(),
            group_client_limit: default_group_client_limit(),
            presence_ttl_secs: default_presence_ttl(),
            fanout_topic: default_fanout_topic(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:7800".to_string(),
                max_connections: default_max_connections(),
                max_message_size: default_max_message_size(),
            },
            node: NodeSettings {
                advertise_host: "127.0.0.1".to_string(),
                advertise_port: 7801,
                crypto_key: "relay-change-me".to_string(),
            },
            heartbeat: HeartbeatSettings::default(),
            delivery: DeliverySettings::default(),
            cluster: ClusterSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, writing a default file first
    /// if none exists.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Cluster settings in core form, `None` when clustering is disabled.
    pub fn cluster_config(&self) -> Option<ClusterConfig> {
        self.cluster.enabled.then(|| ClusterConfig {
            group_client_limit: self.cluster.group_client_limit,
            presence_ttl_secs: self.cluster.presence_ttl_secs,
            fanout_topic: self.cluster.fanout_topic.clone(),
            service_name: self.cluster.service_name.clone(),
        })
    }

    /// Translates the file-level settings into the relay core's configuration.
    pub fn to_relay_config(&self) -> Result<RelayConfig, Box<dyn std::error::Error>> {
        Ok(RelayConfig {
            bind_address: self.server.bind_address.parse()?,
            advertise: NodeAddr::new(self.node.advertise_host.clone(), self.node.advertise_port),
            crypto_key: self.node.crypto_key.clone(),
            max_message_size: self.server.max_message_size,
            max_connections: self.server.max_connections,
            heartbeat: HeartbeatConfig {
                interval_secs: self.heartbeat.interval_secs,
                probe_timeout_secs: self.heartbeat.probe_timeout_secs,
            },
            delivery: DeliveryConfig {
                queue_capacity: self.delivery.queue_capacity,
                overflow: self.delivery.overflow,
                write_timeout_secs: self.delivery.write_timeout_secs,
            },
            cluster: self.cluster_config(),
        })
    }

    /// Validates the configuration settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        let host = &self.node.advertise_host;
        if host.is_empty() || host.contains(':') {
            return Err(format!(
                "Invalid advertise host: '{host}'. Must be a hostname or IPv4 address"
            ));
        }

        if self.node.crypto_key.is_empty() {
            return Err("node.crypto_key cannot be empty".to_string());
        }

        if self.heartbeat.interval_secs == 0 || self.heartbeat.probe_timeout_secs == 0 {
            return Err("heartbeat intervals must be greater than 0".to_string());
        }

        if self.delivery.queue_capacity == 0 {
            return Err("delivery.queue_capacity must be greater than 0".to_string());
        }

        if self.delivery.write_timeout_secs == 0 {
            return Err("delivery.write_timeout_secs must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.cluster.enabled {
            if self.cluster.backend != "memory" {
                return Err(format!("Unsupported cluster backend: {}", self.cluster.backend));
            }
            if self.cluster.group_client_limit == 0 {
                return Err("cluster.group_client_limit must be greater than 0".to_string());
            }
            if self.cluster.fanout_topic.is_empty() {
                return Err("cluster.fanout_topic cannot be empty".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address, "127.0.0.1:7800");
        assert_eq!(config.server.max_message_size, 8192);
        assert_eq!(config.heartbeat.interval_secs, 25);
        assert_eq!(config.heartbeat.probe_timeout_secs, 10);
        assert_eq!(config.delivery.queue_capacity, 10);
        assert_eq!(config.delivery.overflow, OverflowPolicy::Block);
        assert!(!config.cluster.enabled);
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.node.advertise_port, 7801);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path().to_path_buf();

        let toml_content = r#"
[server]
bind_address = "0.0.0.0:9000"

[node]
advertise_host = "10.0.0.5"
advertise_port = 9001
crypto_key = "secret"

[delivery]
queue_capacity = 64
overflow = "reject"
write_timeout_secs = 3

[cluster]
enabled = true
group_client_limit = 50

[logging]
level = "debug"
json_format = true
"#;
        fs::write(&temp_path, toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_path).await.unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.max_connections, 10_000);
        assert_eq!(config.heartbeat.interval_secs, 25);
        assert_eq!(config.delivery.overflow, OverflowPolicy::Reject);

        let relay = config.to_relay_config().unwrap();
        assert_eq!(relay.bind_address.port(), 9000);
        assert_eq!(relay.advertise, NodeAddr::new("10.0.0.5", 9001));
        assert_eq!(relay.delivery.queue_capacity, 64);
        assert_eq!(relay.delivery.write_timeout_secs, 3);
        let cluster = relay.cluster.expect("cluster enabled");
        assert_eq!(cluster.group_client_limit, 50);
        assert_eq!(cluster.presence_ttl_secs, 86_400);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.node.advertise_host = "::1".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.node.crypto_key.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cluster.enabled = true;
        config.cluster.backend = "zookeeper".to_string();
        assert!(config.validate().is_err());

        // backend is only checked when clustering is on
        config.cluster.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_node_conversion() {
        let relay = AppConfig::default().to_relay_config().unwrap();
        assert!(relay.cluster.is_none());
        assert!(relay.validate().is_ok());
    }
}
