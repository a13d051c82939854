//! Error types and handling for the relay.
//!
//! This module defines the error types that can occur while issuing client
//! identifiers, tracking connections and groups, and routing messages.

use crate::token::ClientId;

/// Enumeration of possible relay errors.
///
/// Identifier and capacity errors are returned synchronously to the caller
/// that triggered them. Transport and backend failures carry a description
/// of the underlying cause.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The client identifier could not be unsealed or did not decode to a
    /// `host:port` pair
    #[error("Malformed client identifier: {0}")]
    MalformedIdentifier(String),

    /// The client is not connected to this node
    #[error("Client not alive: {0}")]
    ClientNotAlive(ClientId),

    /// Joining the group would exceed the configured member limit
    #[error("Group '{group}' is at capacity ({limit} members)")]
    GroupCapacityExceeded { group: String, limit: usize },

    /// Routing could not resolve a destination
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// The node already holds its maximum number of connections
    #[error("Connection limit of {0} reached")]
    ConnectionLimit(usize),

    /// An identifier collided with a live registry entry
    #[error("Duplicate client identifier: {0}")]
    DuplicateClient(ClientId),

    /// The delivery queue is full and the overflow policy rejects new items
    #[error("Local delivery queue is full (capacity {0})")]
    DeliveryQueueFull(usize),

    /// The delivery writer has stopped and no longer accepts items
    #[error("Local delivery queue is closed")]
    DeliveryClosed,

    /// Writing to a client socket failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The shared store, fan-out bus, forwarder or directory failed
    #[error("Cluster backend error: {0}")]
    Backend(String),

    /// Network-related errors such as binding failures or handshake issues
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal failures that indicate a bug rather than bad input
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure writing to, probing or closing a client transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("socket closed")]
    Closed,

    #[error("write failed: {0}")]
    Write(String),

    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),
}
