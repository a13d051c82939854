//! Connection management for client connections.
//!
//! This module handles the lifecycle of client connections: the transport
//! abstraction, the per-connection record, the local registry that owns
//! every live connection on this node, and the accept/teardown paths.

pub mod client;
pub mod lifecycle;
pub mod registry;
pub mod socket;

pub use client::{ClientConnection, ConnectionState};
pub use lifecycle::{ConnectionLifecycle, DisconnectReason};
pub use registry::{ConnectionRegistry, RemovedClient};
pub use socket::{ClientSocket, WsClientSocket};
