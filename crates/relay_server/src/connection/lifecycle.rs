//! Accept and teardown paths for client connections.
//!
//! Every way a connection can end (client close, explicit close request,
//! failed heartbeat, server shutdown) funnels through
//! [`ConnectionLifecycle::teardown`], so registry, group and presence
//! cleanup happen in exactly one place.

use super::client::{ClientConnection, ConnectionState};
use super::registry::ConnectionRegistry;
use super::socket::ClientSocket;
use crate::cluster::ClusterBackend;
use crate::error::RelayError;
use crate::groups::GroupMembership;
use crate::token::{ClientId, TokenCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on sending a close frame to a peer that may be gone.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a connection is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the transport or the read loop failed
    ClientClosed,
    /// An operator or API caller asked for the close
    Requested,
    /// A liveness probe failed or timed out
    HeartbeatFailed,
    /// The node is shutting down
    Shutdown,
}

impl DisconnectReason {
    fn teardown_state(self) -> ConnectionState {
        match self {
            DisconnectReason::HeartbeatFailed => ConnectionState::Evicted,
            _ => ConnectionState::Disconnecting,
        }
    }

    fn close_message(self) -> &'static str {
        match self {
            DisconnectReason::ClientClosed => "closed",
            DisconnectReason::Requested => "closed by server",
            DisconnectReason::HeartbeatFailed => "heartbeat timeout",
            DisconnectReason::Shutdown => "server shutting down",
        }
    }
}

/// Owns the connection accept hook and the single teardown path.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    registry: Arc<ConnectionRegistry>,
    groups: Arc<GroupMembership>,
    codec: Arc<TokenCodec>,
    cluster: Option<Arc<ClusterBackend>>,
}

impl ConnectionLifecycle {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        groups: Arc<GroupMembership>,
        codec: Arc<TokenCodec>,
        cluster: Option<Arc<ClusterBackend>>,
    ) -> Self {
        Self {
            registry,
            groups,
            codec,
            cluster,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Issues an identifier for a freshly handshaken socket and registers
    /// the connection as `Active`. Fails with `ConnectionLimit` when the
    /// registry is full.
    ///
    /// In clustered mode the presence record is written afterwards; a store
    /// failure there is logged and does not refuse the connection.
    pub async fn accept(
        &self,
        system_id: &str,
        socket: Arc<dyn ClientSocket>,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Arc<ClientConnection>, RelayError> {
        let id = self.codec.issue_local()?;
        let mut connection = ClientConnection::new(id, system_id, socket);
        if let Some(addr) = remote_addr {
            connection = connection.with_remote_addr(addr);
        }
        let connection = self.registry.add(connection).await?;
        connection.advance(ConnectionState::Active);

        if let Some(cluster) = &self.cluster {
            if let Err(e) = cluster
                .record_presence(&connection.id, self.codec.local_addr())
                .await
            {
                warn!("⚠️ Failed to record presence for {}: {}", connection.id, e);
            }
        }

        Ok(connection)
    }

    /// Pushes out the presence expiry of a client that just proved it is
    /// alive. Best effort: store failures are logged.
    pub async fn refresh_presence(&self, id: &ClientId) {
        if let Some(cluster) = &self.cluster {
            if let Err(e) = cluster.refresh_presence(id).await {
                debug!("Presence refresh failed for {}: {}", id, e);
            }
        }
    }

    /// Closes the socket and removes every trace of the connection.
    ///
    /// Returns `false` if the client is not registered here or another
    /// teardown path already claimed it.
    pub async fn teardown(&self, id: &ClientId, reason: DisconnectReason) -> bool {
        let Some(connection) = self.registry.lookup(id).await else {
            return false;
        };
        if !connection.advance(reason.teardown_state()) {
            debug!("🔁 Teardown of {} already in progress", id);
            return false;
        }

        if reason != DisconnectReason::ClientClosed {
            if tokio::time::timeout(CLOSE_TIMEOUT, connection.close(reason.close_message()))
                .await
                .is_err()
            {
                debug!("⏱️ Close frame to {} timed out", id);
            }
        }

        self.release(id).await;
        connection.advance(ConnectionState::Closed);
        info!("🔌 Client {} disconnected: {:?}", id, reason);
        true
    }

    /// Registry removal followed by cluster group and presence cleanup.
    async fn release(&self, id: &ClientId) {
        let Some(removed) = self.registry.remove(id).await else {
            return;
        };
        self.groups.leave_all(id, &removed.groups).await;
        if let Some(cluster) = &self.cluster {
            if let Err(e) = cluster.forget_presence(id).await {
                warn!("⚠️ Failed to clear presence for {}: {}", id, e);
            }
        }
    }

    /// Tears down every live connection. Used on shutdown.
    pub async fn teardown_all(&self, reason: DisconnectReason) -> usize {
        let mut closed = 0;
        for (id, _) in self.registry.snapshot().await {
            if self.teardown(&id, reason).await {
                closed += 1;
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{group_set_key, presence_key, MemoryCluster, SharedStore};
    use crate::config::ClusterConfig;
    use crate::testing::MockSocket;
    use crate::token::NodeAddr;

    fn lifecycle(cluster: Option<&MemoryCluster>, max_connections: usize) -> ConnectionLifecycle {
        let registry = Arc::new(ConnectionRegistry::with_limit(max_connections));
        let backend = cluster.map(|c| Arc::new(c.backend(ClusterConfig::default())));
        let groups = Arc::new(GroupMembership::new(registry.clone(), backend.clone()));
        let codec = Arc::new(TokenCodec::new("k", NodeAddr::new("127.0.0.1", 7801)));
        ConnectionLifecycle::new(registry, groups, codec, backend)
    }

    #[tokio::test]
    async fn test_accept_registers_active_connection() {
        let lifecycle = lifecycle(None, 10);
        let conn = lifecycle.accept("sys", MockSocket::new(), None).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Active);
        assert!(lifecycle.registry().lookup(&conn.id).await.is_some());
    }

    #[tokio::test]
    async fn test_accept_enforces_connection_limit() {
        let lifecycle = lifecycle(None, 1);
        lifecycle.accept("sys", MockSocket::new(), None).await.unwrap();
        assert!(matches!(
            lifecycle.accept("sys", MockSocket::new(), None).await,
            Err(RelayError::ConnectionLimit(1))
        ));
    }

    #[tokio::test]
    async fn test_teardown_cleans_registry_groups_and_presence() {
        let cluster = MemoryCluster::new();
        let lifecycle = lifecycle(Some(&cluster), 10);
        let socket = MockSocket::new();
        let conn = lifecycle.accept("sys", socket.clone(), None).await.unwrap();
        lifecycle.groups.join_local("sys:g", &conn.id).await.unwrap();
        assert!(!cluster.store.set_members(&presence_key(&conn.id)).await.unwrap().is_empty());

        assert!(lifecycle.teardown(&conn.id, DisconnectReason::Requested).await);

        assert!(lifecycle.registry().lookup(&conn.id).await.is_none());
        assert!(cluster.store.set_members(&group_set_key("sys:g")).await.unwrap().is_empty());
        assert!(cluster.store.set_members(&presence_key(&conn.id)).await.unwrap().is_empty());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(socket.is_closed());

        // second teardown is a no-op
        assert!(!lifecycle.teardown(&conn.id, DisconnectReason::Requested).await);
    }

    #[tokio::test]
    async fn test_client_closed_does_not_send_close_frame() {
        let lifecycle = lifecycle(None, 10);
        let socket = MockSocket::new();
        let conn = lifecycle.accept("sys", socket.clone(), None).await.unwrap();
        assert!(lifecycle.teardown(&conn.id, DisconnectReason::ClientClosed).await);
        assert!(!socket.is_closed());
        assert!(lifecycle.registry().is_empty().await);
    }
}
