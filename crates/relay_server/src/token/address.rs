//! Advertised node addresses.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The `host:port` a node advertises for inter-node traffic.
///
/// The host must not contain `:` because the address is stored inside
/// colon-delimited token plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    host: String,
    port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .split_once(':')
            .ok_or_else(|| RelayError::Config(format!("address '{s}' is not host:port")))?;
        if host.is_empty() || port.contains(':') {
            return Err(RelayError::Config(format!("address '{s}' is not host:port")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| RelayError::Config(format!("invalid port in '{s}': {e}")))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: NodeAddr = "10.0.0.7:7801".parse().unwrap();
        assert_eq!(addr.host(), "10.0.0.7");
        assert_eq!(addr.port(), 7801);
        assert_eq!(addr.to_string(), "10.0.0.7:7801");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("no-port".parse::<NodeAddr>().is_err());
        assert!(":80".parse::<NodeAddr>().is_err());
        assert!("host:notaport".parse::<NodeAddr>().is_err());
        assert!("::1:80".parse::<NodeAddr>().is_err());
    }
}
