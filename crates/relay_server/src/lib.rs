//! # Relay Server - Cluster-Aware Message Relay
//!
//! Clients hold long-lived WebSocket connections to one of many relay nodes.
//! Other systems push messages addressed to a single client or to a named
//! group, and the relay delivers them no matter which node holds the target
//! connection. There is no central connection directory: every node only
//! knows its own connections.
//!
//! ## Architecture Overview
//!
//! * **Locality tokens** ([`token`]) - every client identifier is an
//!   encrypted `host:port:nonce` triple naming the node that owns the
//!   connection, so any node holding the shared key can route to it
//! * **Connection registry** ([`connection`]) - per-node table of live
//!   connections and their local group memberships behind one lock
//! * **Group membership** ([`groups`]) - local index plus, when clustered,
//!   the cluster-wide member sets in the shared store
//! * **Delivery dispatcher** ([`dispatch`]) - one bounded channel and one
//!   writer task for every local socket write
//! * **Heartbeat monitor** ([`heartbeat`]) - periodic concurrent probes that
//!   evict dead connections
//! * **Message router** ([`messaging`]) - local delivery, single-hop remote
//!   forwarding, or fan-out over the cluster bus
//!
//! ### Message Flow
//!
//! 1. A client connects with `?systemId=<tenant>` and receives its
//!    identifier in `{"code":0,"msg":"success","data":{"clientId":".."}}`
//! 2. An API caller asks the [`RelayNode`] to route to that identifier
//! 3. The router unseals the token; a local target is queued for the writer,
//!    a remote one is forwarded once to its owner
//! 4. Group sends are published once on the fan-out bus; every node delivers
//!    to its own members
//!
//! ## Cluster Mode
//!
//! A node is clustered exactly when it is built with a [`ClusterBackend`].
//! The backend bundles the shared store, the fan-out bus, the inter-node
//! forwarder and the service directory. In-memory implementations of all
//! four let several nodes share one process.
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`RelayError`]. Delivery races (a target
//! leaving between routing and writing) are not errors.

pub use cluster::{ClusterBackend, MemoryCluster};
pub use config::{ClusterConfig, DeliveryConfig, HeartbeatConfig, OverflowPolicy, RelayConfig};
pub use error::{RelayError, TransportError};
pub use messaging::{Delivery, GroupDelivery};
pub use node::RelayNode;
pub use server::RelayServer;
pub use shutdown::ShutdownState;
pub use token::{ClientId, NodeAddr};
pub use utils::{create_server, create_server_with_config};

pub mod cluster;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod groups;
pub mod heartbeat;
pub mod messaging;
pub mod node;
pub mod server;
pub mod shutdown;
pub mod token;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
mod tests;
