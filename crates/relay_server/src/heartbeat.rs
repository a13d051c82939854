//! Heartbeat and liveness monitor.
//!
//! Each tick probes every active local connection concurrently, each probe
//! under its own deadline. A connection whose probe fails or times out is
//! evicted through the normal teardown path; the others are unaffected.
//! A successful probe refreshes the client's cluster presence record.

use crate::config::HeartbeatConfig;
use crate::connection::{ConnectionLifecycle, ConnectionState, DisconnectReason};
use crate::error::TransportError;
use crate::shutdown::ShutdownState;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    lifecycle: Arc<ConnectionLifecycle>,
    config: HeartbeatConfig,
}

impl HeartbeatMonitor {
    pub fn new(lifecycle: Arc<ConnectionLifecycle>, config: HeartbeatConfig) -> Self {
        Self { lifecycle, config }
    }

    /// Probes a snapshot of the registry once.
    pub async fn sweep(&self) -> SweepReport {
        let snapshot = self.lifecycle.registry().snapshot().await;
        let deadline = self.config.probe_timeout();

        let mut probes: FuturesUnordered<_> = snapshot
            .into_iter()
            .filter(|(_, connection)| connection.state() == ConnectionState::Active)
            .map(|(id, connection)| async move {
                let result = match tokio::time::timeout(deadline, connection.probe()).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(deadline)),
                };
                match result {
                    Ok(()) => {
                        self.lifecycle.refresh_presence(&id).await;
                        false
                    }
                    Err(e) => {
                        warn!("💔 Heartbeat to {} failed: {}", id, e);
                        self.lifecycle
                            .teardown(&id, DisconnectReason::HeartbeatFailed)
                            .await
                    }
                }
            })
            .collect();

        let mut report = SweepReport::default();
        while let Some(evicted) = probes.next().await {
            report.probed += 1;
            if evicted {
                report.evicted += 1;
            }
        }
        report
    }

    /// Runs sweeps on the configured period until shutdown is initiated.
    pub fn spawn(self: Arc<Self>, shutdown: ShutdownState) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            info!(
                "💓 Heartbeat monitor started (every {:?}, probe timeout {:?})",
                self.config.interval(),
                self.config.probe_timeout()
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.wait_initiated() => break,
                }

                let report = self.sweep().await;
                if report.evicted > 0 {
                    info!("💓 Heartbeat sweep: {} probed, {} evicted", report.probed, report.evicted);
                } else {
                    debug!("💓 Heartbeat sweep: {} probed", report.probed);
                }
            }
            info!("💓 Heartbeat monitor stopping - shutdown initiated");
        })
    }
}
