//! Local delivery dispatcher.
//!
//! Every payload bound for a client connected to this node goes through one
//! bounded channel drained by a single writer task. The channel's FIFO order
//! is the only per-client ordering guarantee the relay gives. Each write is
//! bounded by the configured write timeout, so a peer that stops reading
//! holds the writer for at most that long.

use crate::cluster::ClusterBackend;
use crate::config::{DeliveryConfig, OverflowPolicy};
use crate::connection::ConnectionRegistry;
use crate::error::{RelayError, TransportError};
use crate::token::ClientId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// One payload addressed to one local client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryItem {
    pub client_id: ClientId,
    pub payload: String,
}

/// Producer side of the hand-off channel.
///
/// With [`OverflowPolicy::Block`] a full channel suspends the caller until
/// the writer frees a slot, so a stuck writer stalls every local send on the
/// node. [`OverflowPolicy::Reject`] fails fast with `DeliveryQueueFull`
/// instead.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    sender: mpsc::Sender<DeliveryItem>,
    policy: OverflowPolicy,
    capacity: usize,
}

impl DeliveryQueue {
    pub fn bounded(config: &DeliveryConfig) -> (Self, mpsc::Receiver<DeliveryItem>) {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Self {
            sender,
            policy: config.overflow,
            capacity,
        };
        (queue, receiver)
    }

    /// Hands `payload` to the writer. Once accepted the item is attempted;
    /// there is no cancellation.
    pub async fn enqueue(&self, client_id: ClientId, payload: String) -> Result<(), RelayError> {
        let item = DeliveryItem { client_id, payload };
        match self.policy {
            OverflowPolicy::Block => self
                .sender
                .send(item)
                .await
                .map_err(|_| RelayError::DeliveryClosed),
            OverflowPolicy::Reject => self.sender.try_send(item).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => RelayError::DeliveryQueueFull(self.capacity),
                mpsc::error::TrySendError::Closed(_) => RelayError::DeliveryClosed,
            }),
        }
    }
}

/// What happened to a single delivery item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The client disconnected between routing and delivery
    TargetGone,
    /// The socket write failed or timed out; eviction is left to the
    /// heartbeat monitor
    WriteFailed,
}

/// The single writer draining the delivery channel.
#[derive(Debug)]
pub struct LocalDispatcher {
    registry: Arc<ConnectionRegistry>,
    cluster: Option<Arc<ClusterBackend>>,
    receiver: mpsc::Receiver<DeliveryItem>,
    write_timeout: Duration,
}

impl LocalDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        cluster: Option<Arc<ClusterBackend>>,
        receiver: mpsc::Receiver<DeliveryItem>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cluster,
            receiver,
            write_timeout,
        }
    }

    /// Writes one item to its target's socket.
    pub async fn deliver(&self, item: &DeliveryItem) -> DeliveryOutcome {
        let Some(connection) = self.registry.lookup(&item.client_id).await else {
            trace!("🫥 Dropping message for departed client {}", item.client_id);
            return DeliveryOutcome::TargetGone;
        };

        let write = connection.send_text(&item.payload);
        let written = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.write_timeout)),
        };
        if let Err(e) = written {
            warn!("⚠️ Failed to deliver to {}: {}", item.client_id, e);
            return DeliveryOutcome::WriteFailed;
        }

        // a successful write counts as a liveness signal
        if let Some(cluster) = &self.cluster {
            if let Err(e) = cluster.refresh_presence(&item.client_id).await {
                debug!("Presence refresh failed for {}: {}", item.client_id, e);
            }
        }
        DeliveryOutcome::Delivered
    }

    /// Drains the channel until every producer is gone.
    pub async fn run(mut self) {
        info!("📬 Local delivery dispatcher started");
        while let Some(item) = self.receiver.recv().await {
            self.deliver(&item).await;
        }
        info!("📭 Local delivery dispatcher stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
