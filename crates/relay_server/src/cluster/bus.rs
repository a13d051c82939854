//! Cluster-wide fan-out bus for group broadcasts.

use crate::error::RelayError;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// Message carried on the fan-out topic: one group send, replayed by every
/// node against its own local members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBroadcast {
    pub group_name: String,
    pub message: String,
}

/// Publish/subscribe primitive shared by all nodes.
#[async_trait]
pub trait FanoutBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), RelayError>;

    /// Returns an unbounded stream of payloads published on `topic` after
    /// the call. The stream is consumed once per node process lifetime.
    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>, RelayError>;
}

/// In-process [`FanoutBus`] backed by one broadcast channel per topic.
#[derive(Debug)]
pub struct MemoryBus {
    topics: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// `capacity` is how many payloads a slow subscriber may fall behind
    /// before it starts skipping.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FanoutBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), RelayError> {
        // zero subscribers is not an error
        let _ = self.sender(topic).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>, RelayError> {
        let receiver = self.sender(topic).subscribe();
        let topic = topic.to_string();
        let stream = stream::unfold((receiver, topic), |(mut receiver, topic)| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((payload, (receiver, topic))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("⚠️ Fan-out subscriber on '{}' lagged, skipped {} messages", topic, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
