//! Routing decisions for single-client and group sends.
//!
//! A single-client send resolves the target's locality token: local targets
//! go to the delivery queue, remote ones are forwarded once to their owner.
//! A group send is published once on the fan-out bus when clustered and
//! every node delivers it to its own members; a single node walks the
//! member list itself.

use crate::cluster::{ClusterBackend, GroupBroadcast};
use crate::dispatch::DeliveryQueue;
use crate::error::RelayError;
use crate::groups::GroupMembership;
use crate::token::{ClientId, NodeAddr, TokenCodec};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Where a single-client send went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by this node's delivery queue
    Local,
    /// Handed to the owning node
    Forwarded(NodeAddr),
}

/// What a group send did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupDelivery {
    /// Published on the fan-out bus for every node to deliver
    Published,
    /// Sent member by member on this node
    Local { attempted: usize, failed: usize },
}

#[derive(Debug)]
pub struct MessageRouter {
    codec: Arc<TokenCodec>,
    groups: Arc<GroupMembership>,
    queue: DeliveryQueue,
    cluster: Option<Arc<ClusterBackend>>,
}

impl MessageRouter {
    pub fn new(
        codec: Arc<TokenCodec>,
        groups: Arc<GroupMembership>,
        queue: DeliveryQueue,
        cluster: Option<Arc<ClusterBackend>>,
    ) -> Self {
        Self {
            codec,
            groups,
            queue,
            cluster,
        }
    }

    /// Routes `payload` to one client.
    ///
    /// In single-node mode every target is local by construction and the
    /// token is not resolved. Clustered, an unresolvable token fails with
    /// `InvalidTarget` before anything is sent.
    pub async fn route_to_client(&self, id: &ClientId, payload: &str) -> Result<Delivery, RelayError> {
        let Some(cluster) = &self.cluster else {
            self.queue.enqueue(id.clone(), payload.to_string()).await?;
            return Ok(Delivery::Local);
        };

        let locality = self
            .codec
            .resolve(id)
            .map_err(|e| RelayError::InvalidTarget(format!("{id}: {e}")))?;
        if locality.is_local {
            self.queue.enqueue(id.clone(), payload.to_string()).await?;
            return Ok(Delivery::Local);
        }

        trace!("➡️ Forwarding message for {} to {}", id, locality.owner);
        cluster.forwarder.forward(&locality.owner, id, payload).await?;
        Ok(Delivery::Forwarded(locality.owner))
    }

    /// Owner-side handling of a forwarded send. The target must resolve to
    /// this node, so a forwarded message never takes a second hop.
    pub async fn route_forwarded(&self, id: &ClientId, payload: &str) -> Result<(), RelayError> {
        let locality = self
            .codec
            .resolve(id)
            .map_err(|e| RelayError::InvalidTarget(format!("{id}: {e}")))?;
        if !locality.is_local {
            return Err(RelayError::InvalidTarget(format!(
                "{id} is owned by {}, not this node",
                locality.owner
            )));
        }
        self.queue.enqueue(id.clone(), payload.to_string()).await
    }

    /// Routes `payload` to each id independently.
    pub async fn route_to_clients(
        &self,
        ids: &[ClientId],
        payload: &str,
    ) -> Vec<(ClientId, Result<Delivery, RelayError>)> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.route_to_client(id, payload).await;
            if let Err(e) = &outcome {
                warn!("⚠️ Send to {} failed: {}", id, e);
            }
            outcomes.push((id.clone(), outcome));
        }
        outcomes
    }

    /// Routes `payload` to every member of `group`.
    pub async fn route_to_group(&self, group: &str, payload: &str) -> Result<GroupDelivery, RelayError> {
        if let Some(cluster) = &self.cluster {
            let broadcast = GroupBroadcast {
                group_name: group.to_string(),
                message: payload.to_string(),
            };
            let encoded = serde_json::to_string(&broadcast)
                .map_err(|e| RelayError::Internal(format!("encoding group broadcast: {e}")))?;
            cluster.bus.publish(&cluster.config.fanout_topic, encoded).await?;
            debug!("📢 Published message for group '{}'", group);
            return Ok(GroupDelivery::Published);
        }

        let members = self.groups.members_of(group).await?;
        let mut failed = 0;
        for id in &members {
            // one member failing must not stop the rest
            if let Err(e) = self.route_to_client(id, payload).await {
                warn!("⚠️ Group '{}' send to {} failed: {}", group, id, e);
                failed += 1;
            }
        }
        Ok(GroupDelivery::Local {
            attempted: members.len(),
            failed,
        })
    }

    /// Delivers a fan-out broadcast to the members of its group connected
    /// through this node. Returns how many were queued.
    pub async fn deliver_to_local_group(&self, broadcast: &GroupBroadcast) -> usize {
        let members = self.groups.local_members(&broadcast.group_name).await;
        let mut queued = 0;
        for id in members {
            match self.queue.enqueue(id.clone(), broadcast.message.clone()).await {
                Ok(()) => queued += 1,
                Err(e) => warn!(
                    "⚠️ Group '{}' delivery to {} failed: {}",
                    broadcast.group_name, id, e
                ),
            }
        }
        queued
    }
}
