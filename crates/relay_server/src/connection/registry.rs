//! Local connection registry.
//!
//! The registry owns every live connection accepted by this node together
//! with the local group index. Both sit behind one `RwLock`: lookups take
//! the shared side, every mutation and snapshot takes the exclusive side,
//! and nothing awaits network I/O while holding it.

use super::client::ClientConnection;
use crate::error::RelayError;
use crate::groups::GroupIndex;
use crate::token::ClientId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ClientId, Arc<ClientConnection>>,
    groups: GroupIndex,
}

/// What a successful `remove` took out of the registry.
#[derive(Debug)]
pub struct RemovedClient {
    pub connection: Arc<ClientConnection>,
    /// Groups the client was a member of at removal time
    pub groups: Vec<String>,
}

/// Per-node table of live client connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    max_connections: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// A registry with no connection limit.
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    pub fn with_limit(max_connections: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            max_connections,
        }
    }

    /// Inserts a connection under its identifier.
    ///
    /// The limit check and the insert happen under one write lock, so
    /// concurrent accepts cannot overshoot `max_connections`. Identifiers
    /// are never reused, so an existing entry means something issued the
    /// same token twice; the new connection is refused.
    pub async fn add(&self, connection: ClientConnection) -> Result<Arc<ClientConnection>, RelayError> {
        let connection = Arc::new(connection);
        let mut state = self.state.write().await;
        if state.connections.len() >= self.max_connections {
            return Err(RelayError::ConnectionLimit(self.max_connections));
        }
        if state.connections.contains_key(&connection.id) {
            return Err(RelayError::DuplicateClient(connection.id.clone()));
        }
        state
            .connections
            .insert(connection.id.clone(), connection.clone());
        info!(
            "🔗 Client {} registered (system '{}', {} online)",
            connection.id,
            connection.system_id,
            state.connections.len()
        );
        Ok(connection)
    }

    /// The liveness predicate: `None` means never connected here or
    /// already removed.
    pub async fn lookup(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.state.read().await.connections.get(id).cloned()
    }

    /// Removes the connection and every local group membership it holds.
    /// Idempotent: a second call returns `None`.
    pub async fn remove(&self, id: &ClientId) -> Option<RemovedClient> {
        let mut state = self.state.write().await;
        let connection = state.connections.remove(id)?;
        let groups = state.groups.remove_client(id);
        info!(
            "❌ Client {} removed ({} groups left, {} online)",
            id,
            groups.len(),
            state.connections.len()
        );
        Some(RemovedClient { connection, groups })
    }

    /// Point-in-time copy of all live entries.
    pub async fn snapshot(&self) -> Vec<(ClientId, Arc<ClientConnection>)> {
        let state = self.state.write().await;
        state
            .connections
            .iter()
            .map(|(id, conn)| (id.clone(), conn.clone()))
            .collect()
    }

    /// Adds a live client to a local group. Fails with `ClientNotAlive`
    /// if the client is not in the registry.
    pub async fn join_local(&self, group: &str, id: &ClientId) -> Result<bool, RelayError> {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(id) {
            return Err(RelayError::ClientNotAlive(id.clone()));
        }
        let added = state.groups.insert(group, id);
        debug!("👥 Client {} joined local group '{}'", id, group);
        Ok(added)
    }

    pub async fn local_members(&self, group: &str) -> Vec<ClientId> {
        self.state.read().await.groups.members(group)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
