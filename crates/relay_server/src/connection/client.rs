//! Client connection representation.

use super::socket::ClientSocket;
use crate::error::TransportError;
use crate::token::ClientId;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Lifecycle of a connection.
///
/// `Connecting → Active → {Disconnecting | Evicted} → Closed`. `Closed` is
/// terminal and nothing re-enters `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    /// Explicit close by the client or an operator
    Disconnecting,
    /// Liveness probe failed
    Evicted,
    Closed,
}

impl ConnectionState {
    fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Active)
                | (Connecting, Disconnecting)
                | (Active, Disconnecting)
                | (Active, Evicted)
                | (Disconnecting, Closed)
                | (Evicted, Closed)
        )
    }
}

/// A live client connection owned by this node's registry.
pub struct ClientConnection {
    /// Locality token issued at accept time
    pub id: ClientId,

    /// Tenant/system the client connected under
    pub system_id: String,

    /// Remote network address, when known
    pub remote_addr: Option<SocketAddr>,

    /// When this connection was accepted
    pub connected_at: SystemTime,

    socket: Arc<dyn ClientSocket>,
    state: Mutex<ConnectionState>,
}

impl ClientConnection {
    pub fn new(id: ClientId, system_id: impl Into<String>, socket: Arc<dyn ClientSocket>) -> Self {
        Self {
            id,
            system_id: system_id.into(),
            remote_addr: None,
            connected_at: SystemTime::now(),
            socket,
            state: Mutex::new(ConnectionState::Connecting),
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves to `next` if the transition is legal. Returns `false` when the
    /// connection is already past that point, which makes teardown paths
    /// racing each other safe: only one wins.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.can_advance_to(next) {
            *state = next;
            true
        } else {
            false
        }
    }

    pub async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.socket.send_text(text).await
    }

    pub async fn probe(&self) -> Result<(), TransportError> {
        self.socket.probe().await
    }

    pub async fn close(&self, reason: &str) {
        self.socket.close(reason).await
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("system_id", &self.system_id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSocket;

    #[test]
    fn test_state_machine_transitions() {
        let conn = ClientConnection::new(ClientId::from("c1"), "sys", MockSocket::new());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.advance(ConnectionState::Active));
        assert!(conn.advance(ConnectionState::Evicted));
        // a second teardown path loses the race
        assert!(!conn.advance(ConnectionState::Disconnecting));
        assert!(conn.advance(ConnectionState::Closed));
        assert!(!conn.advance(ConnectionState::Active));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
