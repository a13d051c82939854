//! Convenience constructors for relay servers.

use crate::cluster::{ClusterBackend, MemoryCluster};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::server::RelayServer;

/// Creates a single-node relay server with default configuration.
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use relay_server::create_server;
///
/// let server = create_server().expect("default configuration is valid");
/// assert!(!server.node().is_clustered());
/// # }
/// ```
pub fn create_server() -> Result<RelayServer, RelayError> {
    RelayServer::new(RelayConfig::default(), None)
}

/// Creates a relay server from `config`.
///
/// When `config.cluster` is set the node joins `cluster`, or a fresh
/// in-process cluster if none is given. Without cluster settings the node
/// runs single-node and `cluster` is ignored.
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use relay_server::{create_server_with_config, RelayConfig};
///
/// let config = RelayConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config, None).unwrap();
/// # }
/// ```
pub fn create_server_with_config(
    config: RelayConfig,
    cluster: Option<&MemoryCluster>,
) -> Result<RelayServer, RelayError> {
    let backend: Option<ClusterBackend> = config.cluster.clone().map(|settings| match cluster {
        Some(shared) => shared.backend(settings),
        None => MemoryCluster::new().backend(settings),
    });
    let server = RelayServer::new(config, backend)?;
    if let Some(shared) = cluster {
        if server.node().is_clustered() {
            server.node().attach_to_mesh(&shared.mesh);
        }
    }
    Ok(server)
}
