//! Forwarding work to the node that owns a client.
//!
//! The owning node receives the forwarded request through
//! [`RemoteInbound`] and runs its normal routing logic, which always
//! resolves the client as local there. A send therefore crosses at most
//! one network hop.

use crate::error::RelayError;
use crate::token::{ClientId, NodeAddr};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Caller side of inter-node RPC.
///
/// Calls are not retried by the router; implementations must tolerate a
/// caller-driven retry of the same request.
#[async_trait]
pub trait RemoteForwarder: Send + Sync {
    async fn forward(&self, owner: &NodeAddr, client_id: &ClientId, payload: &str) -> Result<(), RelayError>;

    async fn forward_join(&self, owner: &NodeAddr, group: &str, client_id: &ClientId) -> Result<(), RelayError>;

    async fn forward_close(&self, owner: &NodeAddr, client_id: &ClientId) -> Result<(), RelayError>;
}

/// Owner side of inter-node RPC.
#[async_trait]
pub trait RemoteInbound: Send + Sync {
    async fn deliver_forwarded(&self, client_id: &ClientId, payload: &str) -> Result<(), RelayError>;

    async fn join_forwarded(&self, group: &str, client_id: &ClientId) -> Result<(), RelayError>;

    async fn close_forwarded(&self, client_id: &ClientId) -> Result<(), RelayError>;
}

/// In-process [`RemoteForwarder`] that calls straight into registered nodes.
#[derive(Default)]
pub struct MemoryMesh {
    nodes: DashMap<NodeAddr, Weak<dyn RemoteInbound>>,
}

impl std::fmt::Debug for MemoryMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMesh")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `node` reachable at `addr`. The mesh holds a weak reference,
    /// so a dropped node becomes unreachable.
    pub fn register(&self, addr: NodeAddr, node: &Arc<dyn RemoteInbound>) {
        debug!("🕸️ Mesh: node {} registered", addr);
        self.nodes.insert(addr, Arc::downgrade(node));
    }

    fn target(&self, owner: &NodeAddr) -> Result<Arc<dyn RemoteInbound>, RelayError> {
        self.nodes
            .get(owner)
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| RelayError::Backend(format!("node {owner} is unreachable")))
    }
}

#[async_trait]
impl RemoteForwarder for MemoryMesh {
    async fn forward(&self, owner: &NodeAddr, client_id: &ClientId, payload: &str) -> Result<(), RelayError> {
        let target = self.target(owner)?;
        target.deliver_forwarded(client_id, payload).await
    }

    async fn forward_join(&self, owner: &NodeAddr, group: &str, client_id: &ClientId) -> Result<(), RelayError> {
        let target = self.target(owner)?;
        target.join_forwarded(group, client_id).await
    }

    async fn forward_close(&self, owner: &NodeAddr, client_id: &ClientId) -> Result<(), RelayError> {
        let target = self.target(owner)?;
        target.close_forwarded(client_id).await
    }
}
