//! The relay node: one process's registry, router, dispatcher and heartbeat
//! monitor wired together behind the operations API callers use.

use crate::cluster::{ClusterBackend, GroupBroadcast, MemoryMesh, RemoteInbound};
use crate::config::RelayConfig;
use crate::connection::{
    ClientConnection, ClientSocket, ConnectionLifecycle, ConnectionRegistry, DisconnectReason,
};
use crate::dispatch::{DeliveryQueue, LocalDispatcher};
use crate::error::RelayError;
use crate::groups::GroupMembership;
use crate::heartbeat::HeartbeatMonitor;
use crate::messaging::{Delivery, GroupDelivery, MessageRouter};
use crate::shutdown::ShutdownState;
use crate::token::{ClientId, NodeAddr, TokenCodec};
use async_trait::async_trait;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A relay node.
///
/// `RelayNode` owns one process's share of the relay: the clients connected
/// here, their local group memberships, the single delivery writer and the
/// heartbeat monitor. Cluster mode is decided once, at construction, by
/// whether a [`ClusterBackend`] is supplied.
///
/// # Architecture
///
/// * **Token codec**: issues client identifiers that name this node and
///   resolves any identifier to its owner
/// * **Registry and groups**: live connections and group membership under
///   one lock, mirrored to the shared store when clustered
/// * **Router**: local hand-off, a single forwarding hop to the owner, or a
///   fan-out publish for group sends
/// * **Dispatcher**: the one task that writes payloads to local sockets
/// * **Heartbeat**: probes every connection and evicts the ones that fail
///
/// # Examples
///
/// ```rust,no_run
/// use relay_server::{RelayConfig, RelayNode, ShutdownState};
///
/// # async fn run() -> Result<(), relay_server::RelayError> {
/// let node = RelayNode::new(RelayConfig::default(), None)?;
/// node.start(ShutdownState::new()).await?;
/// let online = node.online_count().await;
/// # Ok(())
/// # }
/// ```
pub struct RelayNode {
    config: RelayConfig,
    codec: Arc<TokenCodec>,
    registry: Arc<ConnectionRegistry>,
    groups: Arc<GroupMembership>,
    lifecycle: Arc<ConnectionLifecycle>,
    router: Arc<MessageRouter>,
    heartbeat: Arc<HeartbeatMonitor>,
    /// Present only in cluster mode
    cluster: Option<Arc<ClusterBackend>>,
    /// Taken by the first `start`
    dispatcher: Mutex<Option<LocalDispatcher>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RelayNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayNode")
            .field("advertise", &self.config.advertise)
            .field("clustered", &self.cluster.is_some())
            .finish_non_exhaustive()
    }
}

impl RelayNode {
    /// Builds a node from validated configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Node settings; validated before anything is built
    /// * `cluster` - Shared store, bus, forwarder and directory, or `None`
    ///   for single-node mode
    ///
    /// # Returns
    ///
    /// The node, not yet started, or `RelayError::Config` when validation
    /// fails.
    pub fn new(config: RelayConfig, cluster: Option<ClusterBackend>) -> Result<Self, RelayError> {
        config.validate()?;

        let cluster = cluster.map(Arc::new);
        let codec = Arc::new(TokenCodec::new(&config.crypto_key, config.advertise.clone()));
        let registry = Arc::new(ConnectionRegistry::with_limit(config.max_connections));
        let groups = Arc::new(GroupMembership::new(registry.clone(), cluster.clone()));
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            registry.clone(),
            groups.clone(),
            codec.clone(),
            cluster.clone(),
        ));

        let (queue, receiver) = DeliveryQueue::bounded(&config.delivery);
        let dispatcher = LocalDispatcher::new(
            registry.clone(),
            cluster.clone(),
            receiver,
            config.delivery.write_timeout(),
        );
        let router = Arc::new(MessageRouter::new(
            codec.clone(),
            groups.clone(),
            queue,
            cluster.clone(),
        ));
        let heartbeat = Arc::new(HeartbeatMonitor::new(lifecycle.clone(), config.heartbeat.clone()));

        Ok(Self {
            config,
            codec,
            registry,
            groups,
            lifecycle,
            router,
            heartbeat,
            cluster,
            dispatcher: Mutex::new(Some(dispatcher)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn advertise_addr(&self) -> &NodeAddr {
        self.codec.local_addr()
    }

    pub fn is_clustered(&self) -> bool {
        self.cluster.is_some()
    }

    /// Starts the background tasks: the delivery writer, the heartbeat
    /// monitor and, when clustered, the fan-out listener.
    ///
    /// A clustered node registers with the service directory, looks up its
    /// peers and subscribes to the fan-out topic first; any failure there
    /// is returned and nothing is left running.
    pub async fn start(&self, shutdown: ShutdownState) -> Result<(), RelayError> {
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| RelayError::Internal("relay node already started".to_string()))?;

        let mut handles = Vec::new();
        if let Some(cluster) = &self.cluster {
            let service = &cluster.config.service_name;
            let advertise = self.codec.local_addr();
            cluster.directory.register(service, advertise).await?;
            let peers = cluster.directory.lookup(service).await?;
            info!("🌐 Registered {} as '{}' ({} node(s) in cluster)", advertise, service, peers.len());

            let subscription = cluster.bus.subscribe(&cluster.config.fanout_topic).await?;
            info!("📡 Subscribed to fan-out topic '{}'", cluster.config.fanout_topic);
            handles.push(spawn_fanout_listener(
                subscription,
                self.router.clone(),
                shutdown.clone(),
            ));
        }

        handles.push(dispatcher.spawn());
        handles.push(self.heartbeat.clone().spawn(shutdown));

        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(handles);
        info!(
            "✅ Relay node {} started ({} mode)",
            self.codec.local_addr(),
            if self.is_clustered() { "cluster" } else { "single-node" }
        );
        Ok(())
    }

    /// Closes every connection and stops the background tasks.
    pub async fn stop(&self) {
        let closed = self.lifecycle.teardown_all(DisconnectReason::Shutdown).await;
        info!("🧹 Closed {} connection(s)", closed);
        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
    }

    /// Connection-accepted hook: issues an identifier and registers the
    /// connection.
    pub async fn connect(&self, system_id: &str, socket: Arc<dyn ClientSocket>) -> Result<ClientId, RelayError> {
        let connection = self.accept(system_id, socket, None).await?;
        Ok(connection.id.clone())
    }

    pub async fn accept(
        &self,
        system_id: &str,
        socket: Arc<dyn ClientSocket>,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Arc<ClientConnection>, RelayError> {
        self.lifecycle.accept(system_id, socket, remote_addr).await
    }

    /// Teardown after the client's transport went away.
    pub async fn disconnect(&self, id: &ClientId) -> bool {
        self.lifecycle.teardown(id, DisconnectReason::ClientClosed).await
    }

    /// Closes a client wherever it is connected.
    pub async fn close_client(&self, id: &ClientId) -> Result<(), RelayError> {
        let locality = self.codec.resolve(id)?;
        if locality.is_local {
            return self.close_local(id).await;
        }
        match &self.cluster {
            Some(cluster) => cluster.forwarder.forward_close(&locality.owner, id).await,
            None => Err(RelayError::InvalidTarget(format!(
                "{id} is owned by {} and this node is not clustered",
                locality.owner
            ))),
        }
    }

    async fn close_local(&self, id: &ClientId) -> Result<(), RelayError> {
        if self.lifecycle.teardown(id, DisconnectReason::Requested).await {
            Ok(())
        } else {
            Err(RelayError::ClientNotAlive(id.clone()))
        }
    }

    /// Adds a client to `group`, forwarding to the owning node when the
    /// client is connected elsewhere in the cluster.
    pub async fn join_group(&self, group: &str, id: &ClientId) -> Result<(), RelayError> {
        let Some(cluster) = &self.cluster else {
            return self.groups.join_local(group, id).await;
        };
        let locality = self.codec.resolve(id)?;
        if locality.is_local {
            self.groups.join_local(group, id).await
        } else {
            debug!("➡️ Forwarding join of {} to '{}' to {}", id, group, locality.owner);
            cluster.forwarder.forward_join(&locality.owner, group, id).await
        }
    }

    pub async fn members_of(&self, group: &str) -> Result<Vec<ClientId>, RelayError> {
        self.groups.members_of(group).await
    }

    pub async fn route_to_client(&self, id: &ClientId, payload: &str) -> Result<Delivery, RelayError> {
        self.router.route_to_client(id, payload).await
    }

    pub async fn route_to_clients(
        &self,
        ids: &[ClientId],
        payload: &str,
    ) -> Vec<(ClientId, Result<Delivery, RelayError>)> {
        self.router.route_to_clients(ids, payload).await
    }

    pub async fn route_to_group(&self, group: &str, payload: &str) -> Result<GroupDelivery, RelayError> {
        self.router.route_to_group(group, payload).await
    }

    /// Live connections on this node.
    pub async fn online_count(&self) -> usize {
        self.registry.len().await
    }

    /// Makes this node reachable through an in-process mesh.
    pub fn attach_to_mesh(self: &Arc<Self>, mesh: &MemoryMesh) {
        let inbound: Arc<dyn RemoteInbound> = self.clone();
        mesh.register(self.codec.local_addr().clone(), &inbound);
    }
}

#[async_trait]
impl RemoteInbound for RelayNode {
    async fn deliver_forwarded(&self, client_id: &ClientId, payload: &str) -> Result<(), RelayError> {
        self.router.route_forwarded(client_id, payload).await
    }

    async fn join_forwarded(&self, group: &str, client_id: &ClientId) -> Result<(), RelayError> {
        self.groups.join_local(group, client_id).await
    }

    async fn close_forwarded(&self, client_id: &ClientId) -> Result<(), RelayError> {
        self.close_local(client_id).await
    }
}

/// Consumes the fan-out subscription for the life of the node, delivering
/// each broadcast to local group members only.
fn spawn_fanout_listener(
    mut subscription: futures::stream::BoxStream<'static, String>,
    router: Arc<MessageRouter>,
    shutdown: ShutdownState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                next = subscription.next() => match next {
                    Some(payload) => payload,
                    None => {
                        error!("❌ Fan-out subscription ended");
                        break;
                    }
                },
                _ = shutdown.wait_initiated() => break,
            };

            match serde_json::from_str::<GroupBroadcast>(&payload) {
                Ok(broadcast) => {
                    let queued = router.deliver_to_local_group(&broadcast).await;
                    debug!("📢 Group '{}' broadcast delivered to {} local member(s)", broadcast.group_name, queued);
                }
                Err(e) => warn!("⚠️ Ignoring malformed fan-out payload: {}", e),
            }
        }
        info!("📡 Fan-out listener stopped");
    })
}
