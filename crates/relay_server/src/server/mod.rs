//! WebSocket server: the accept loop and per-connection handling.
//!
//! The server is a thin shell around a [`RelayNode`](crate::node::RelayNode):
//! it binds the listener, upgrades sockets and hands each one to the node's
//! accept hook.

pub mod core;
pub mod handlers;

pub use core::RelayServer;
