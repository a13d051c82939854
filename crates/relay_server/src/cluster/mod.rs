//! Cluster collaborators and the cluster/single-node strategy boundary.
//!
//! A node is clustered exactly when it holds a [`ClusterBackend`]. The
//! router, group membership and connection lifecycle consult
//! `Option<Arc<ClusterBackend>>` once instead of re-deriving the mode at
//! every call site.
//!
//! The backend bundles four narrow collaborator interfaces:
//!
//! * [`SharedStore`] - set/expiry operations for group and presence records
//! * [`FanoutBus`] - publish/subscribe used to replicate group sends
//! * [`RemoteForwarder`] - delivers work to the node that owns a client
//! * [`ServiceDirectory`] - node registration and lookup at startup
//!
//! In-memory implementations of all four live alongside the traits so a
//! set of nodes can share state inside one process.

pub mod bus;
pub mod directory;
pub mod forward;
pub mod store;

pub use bus::{FanoutBus, GroupBroadcast, MemoryBus};
pub use directory::{MemoryDirectory, ServiceDirectory};
pub use forward::{MemoryMesh, RemoteForwarder, RemoteInbound};
pub use store::{MemoryStore, SharedStore};

use crate::config::ClusterConfig;
use crate::error::RelayError;
use crate::token::{ClientId, NodeAddr};
use std::sync::Arc;
use std::time::Duration;

/// Set of every group key that has ever had a cluster member.
pub const GROUP_LIST_KEY: &str = "relay:groups";

/// Shared-store key of a group's cluster-wide member set.
pub fn group_set_key(group: &str) -> String {
    format!("relay:group:{group}")
}

/// Shared-store key of a client's presence record.
pub fn presence_key(id: &ClientId) -> String {
    format!("relay:client:{id}")
}

/// Scopes a group name to the system (tenant) that owns it.
pub fn group_key(system_id: &str, group_name: &str) -> String {
    format!("{system_id}:{group_name}")
}

/// Handles to the shared cluster infrastructure plus cluster settings.
pub struct ClusterBackend {
    pub store: Arc<dyn SharedStore>,
    pub bus: Arc<dyn FanoutBus>,
    pub forwarder: Arc<dyn RemoteForwarder>,
    pub directory: Arc<dyn ServiceDirectory>,
    pub config: ClusterConfig,
}

impl std::fmt::Debug for ClusterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ClusterBackend {
    pub fn new(
        config: ClusterConfig,
        store: Arc<dyn SharedStore>,
        bus: Arc<dyn FanoutBus>,
        forwarder: Arc<dyn RemoteForwarder>,
        directory: Arc<dyn ServiceDirectory>,
    ) -> Self {
        Self {
            store,
            bus,
            forwarder,
            directory,
            config,
        }
    }

    fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.config.presence_ttl_secs)
    }

    /// Writes the expiring presence record for a freshly accepted client.
    pub async fn record_presence(&self, id: &ClientId, owner: &NodeAddr) -> Result<(), RelayError> {
        let key = presence_key(id);
        self.store.set_add(&key, &owner.to_string()).await?;
        self.store.expire(&key, self.presence_ttl()).await?;
        Ok(())
    }

    /// Pushes the presence expiry out by another TTL.
    pub async fn refresh_presence(&self, id: &ClientId) -> Result<(), RelayError> {
        self.store.expire(&presence_key(id), self.presence_ttl()).await?;
        Ok(())
    }

    pub async fn forget_presence(&self, id: &ClientId) -> Result<(), RelayError> {
        self.store.delete(&presence_key(id)).await?;
        Ok(())
    }
}

/// In-process cluster: one store, bus, mesh and directory shared by every
/// node built from it.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MemoryBus>,
    pub mesh: Arc<MemoryMesh>,
    pub directory: Arc<MemoryDirectory>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            bus: Arc::new(MemoryBus::new()),
            mesh: Arc::new(MemoryMesh::new()),
            directory: Arc::new(MemoryDirectory::new()),
        }
    }

    /// Builds a backend for one node that shares this cluster's state.
    pub fn backend(&self, config: ClusterConfig) -> ClusterBackend {
        ClusterBackend::new(
            config,
            self.store.clone(),
            self.bus.clone(),
            self.mesh.clone(),
            self.directory.clone(),
        )
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}
