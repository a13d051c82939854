//! Node registration and discovery.
//!
//! Used only during node startup, never on the routing path. Lease renewal
//! belongs to the concrete coordination service behind the trait.

use crate::error::RelayError;
use crate::token::NodeAddr;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;

#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Announces that `addr` serves `service`.
    async fn register(&self, service: &str, addr: &NodeAddr) -> Result<(), RelayError>;

    async fn lookup(&self, service: &str) -> Result<Vec<NodeAddr>, RelayError>;
}

/// In-process [`ServiceDirectory`].
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    services: DashMap<String, BTreeSet<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceDirectory for MemoryDirectory {
    async fn register(&self, service: &str, addr: &NodeAddr) -> Result<(), RelayError> {
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(addr.to_string());
        Ok(())
    }

    async fn lookup(&self, service: &str) -> Result<Vec<NodeAddr>, RelayError> {
        let entries: Vec<String> = self
            .services
            .get(service)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        entries.iter().map(|addr| addr.parse()).collect()
    }
}
