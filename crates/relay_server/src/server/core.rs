//! Core relay server implementation.

use crate::cluster::ClusterBackend;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::node::RelayNode;
use crate::server::handlers::handle_connection;
use crate::shutdown::ShutdownState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, trace};

/// Binds the WebSocket listener and feeds accepted sockets to a
/// [`RelayNode`].
#[derive(Debug)]
pub struct RelayServer {
    node: Arc<RelayNode>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl RelayServer {
    /// Creates a server. Passing a cluster backend runs the node clustered.
    pub fn new(config: RelayConfig, cluster: Option<ClusterBackend>) -> Result<Self, RelayError> {
        let node = Arc::new(RelayNode::new(config, cluster)?);
        let (shutdown_sender, _) = broadcast::channel(1);
        Ok(Self {
            node,
            shutdown_sender,
        })
    }

    /// The node behind this server, for API callers.
    pub fn node(&self) -> &Arc<RelayNode> {
        &self.node
    }

    /// Starts the node and serves until [`RelayServer::shutdown`] is called.
    pub async fn start(&self) -> Result<(), RelayError> {
        self.start_with_shutdown_state(ShutdownState::new()).await
    }

    /// Starts the node and serves until `shutdown_state` is initiated.
    ///
    /// # Arguments
    ///
    /// * `shutdown_state` - Shared with the application; initiating it stops
    ///   the accept loop, the heartbeat monitor and the fan-out listener
    ///
    /// # Returns
    ///
    /// `Ok(())` after a graceful shutdown. Fails before serving when the
    /// listener cannot bind or a clustered node cannot register with the
    /// directory or subscribe to the fan-out topic.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use relay_server::{create_server, ShutdownState};
    ///
    /// # async fn run() -> Result<(), relay_server::RelayError> {
    /// let server = create_server()?;
    /// let shutdown = ShutdownState::new();
    /// let serving = shutdown.clone();
    /// tokio::spawn(async move { server.start_with_shutdown_state(serving).await });
    /// // later
    /// shutdown.initiate_shutdown();
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Startup Sequence
    ///
    /// 1. Start the node's background tasks (cluster registration first,
    ///    when clustered)
    /// 2. Bind the TCP listener
    /// 3. Accept connections until shutdown
    /// 4. Close every remaining connection and mark shutdown complete
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<(), RelayError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_state).await
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, RelayError> {
        let address = self.node.config().bind_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| RelayError::Network(format!("failed to bind {address}: {e}")))?;
        Ok(listener)
    }

    /// Runs the node on an already bound listener.
    pub async fn serve(&self, listener: TcpListener, shutdown_state: ShutdownState) -> Result<(), RelayError> {
        let local = listener
            .local_addr()
            .map_err(|e| RelayError::Network(e.to_string()))?;
        info!("🚀 Starting relay server on {}", local);
        info!("🏷️ Advertising {} to the cluster", self.node.advertise_addr());

        self.node.start(shutdown_state.clone()).await?;

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        trace!("📥 Accepted TCP connection from {}", addr);
                        let node = self.node.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, node).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                _ = shutdown_state.wait_initiated() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    shutdown_state.initiate_shutdown();
                    break;
                }
            }
        }

        info!("🧹 Performing server cleanup...");
        self.node.stop().await;
        shutdown_state.complete_shutdown();
        info!("Server stopped");
        Ok(())
    }

    /// Asks a running server to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_sender.send(());
    }
}
