//! Relay configuration types and defaults.
//!
//! This module contains the configuration structures used to initialize a
//! relay node: network binding, the advertised node address embedded in
//! client identifiers, heartbeat timing, the local delivery queue, and the
//! optional cluster settings.

use crate::token::NodeAddr;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for a relay node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// The socket address the WebSocket listener binds to
    pub bind_address: SocketAddr,

    /// Address other nodes use to reach this node; embedded in every
    /// client identifier issued here
    pub advertise: NodeAddr,

    /// Shared symmetric key used to seal client identifiers
    pub crypto_key: String,

    /// Maximum inbound WebSocket message size in bytes
    pub max_message_size: usize,

    /// Maximum number of concurrent client connections on this node
    pub max_connections: usize,

    /// Heartbeat and eviction settings
    pub heartbeat: HeartbeatConfig,

    /// Local delivery queue settings
    pub delivery: DeliveryConfig,

    /// Cluster settings; `None` runs the node in single-node mode
    pub cluster: Option<ClusterConfig>,
}

/// Heartbeat monitor timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,

    /// Seconds a single liveness probe may take before it counts as failed
    pub probe_timeout_secs: u64,
}

/// What happens when the local delivery queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The enqueuing caller waits until the writer frees a slot
    #[default]
    Block,
    /// The enqueue fails immediately with `DeliveryQueueFull`
    Reject,
}

/// Local delivery dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Capacity of the hand-off channel feeding the single writer
    pub queue_capacity: usize,

    /// Behaviour when the channel is at capacity
    pub overflow: OverflowPolicy,

    /// Seconds the writer waits on one socket write before giving up on it
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

fn default_write_timeout_secs() -> u64 {
    10
}

/// Cluster-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Maximum number of members a group may hold across the cluster
    pub group_client_limit: usize,

    /// Lifetime in seconds of a client's presence record
    pub presence_ttl_secs: u64,

    /// Fan-out bus topic carrying group broadcasts
    pub fanout_topic: String,

    /// Name under which nodes register with the service directory
    pub service_name: String,
}

impl RelayConfig {
    /// Checks the configuration for values the node cannot run with.
    pub fn validate(&self) -> Result<(), crate::RelayError> {
        use crate::RelayError::Config;

        if self.crypto_key.is_empty() {
            return Err(Config("crypto_key cannot be empty".to_string()));
        }
        if self.advertise.host().is_empty() || self.advertise.host().contains(':') {
            return Err(Config(format!(
                "advertised host '{}' must be a non-empty hostname or IPv4 address",
                self.advertise.host()
            )));
        }
        if self.heartbeat.interval_secs == 0 || self.heartbeat.probe_timeout_secs == 0 {
            return Err(Config("heartbeat intervals must be greater than 0".to_string()));
        }
        if self.delivery.queue_capacity == 0 {
            return Err(Config("delivery.queue_capacity must be greater than 0".to_string()));
        }
        if self.delivery.write_timeout_secs == 0 {
            return Err(Config("delivery.write_timeout_secs must be greater than 0".to_string()));
        }
        if let Some(cluster) = &self.cluster {
            if cluster.group_client_limit == 0 {
                return Err(Config("cluster.group_client_limit must be greater than 0".to_string()));
            }
            if cluster.fanout_topic.is_empty() {
                return Err(Config("cluster.fanout_topic cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl DeliveryConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 7800)),
            advertise: NodeAddr::new("127.0.0.1", 7801),
            crypto_key: "relay-change-me".to_string(),
            max_message_size: 8192,
            max_connections: 10_000,
            heartbeat: HeartbeatConfig::default(),
            delivery: DeliveryConfig::default(),
            cluster: None,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 25,
            probe_timeout_secs: 10,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            overflow: OverflowPolicy::Block,
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            group_client_limit: 1000,
            presence_ttl_secs: 86_400,
            fanout_topic: "relay.group.broadcast".to_string(),
            service_name: "relay".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cluster.is_none());
        assert_eq!(config.max_message_size, 8192);
        assert_eq!(config.heartbeat.interval(), Duration::from_secs(25));
        assert_eq!(config.heartbeat.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.delivery.overflow, OverflowPolicy::Block);
        assert_eq!(config.delivery.write_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RelayConfig::default();
        config.crypto_key.clear();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.delivery.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.delivery.write_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.cluster = Some(ClusterConfig {
            group_client_limit: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overflow_policy_serde_names() {
        let json = serde_json::to_string(&OverflowPolicy::Reject).unwrap();
        assert_eq!(json, "\"reject\"");
        let parsed: OverflowPolicy = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(parsed, OverflowPolicy::Block);
    }
}
