//! Shutdown coordination shared by the application and the relay tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Shared shutdown flags plus a wake-up for tasks parked on
/// [`ShutdownState::wait_initiated`].
///
/// Cloning is cheap; every clone observes the same state.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    initiated: AtomicBool,
    complete: AtomicBool,
    notify: Notify,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once shutdown has begun; accept loops and sweeps stop here.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.inner.initiated.load(Ordering::Acquire)
    }

    /// True once the server has released every connection.
    pub fn is_shutdown_complete(&self) -> bool {
        self.inner.complete.load(Ordering::Acquire)
    }

    /// Stops new work and wakes every waiter. Idempotent.
    pub fn initiate_shutdown(&self) {
        if !self.inner.initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn complete_shutdown(&self) {
        self.inner.complete.store(true, Ordering::Release);
        info!("✅ All connections released - ready for final cleanup");
    }

    /// Resolves once shutdown has been initiated, immediately if it already was.
    pub async fn wait_initiated(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_shutdown_initiated() {
                return;
            }
            notified.await;
        }
    }
}
