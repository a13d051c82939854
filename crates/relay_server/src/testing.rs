//! Test doubles shared by the unit and scenario tests.

use crate::connection::ClientSocket;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory transport that records what was written to it.
#[derive(Debug, Default)]
pub struct MockSocket {
    frames: Mutex<Vec<String>>,
    close_reason: Mutex<Option<String>>,
    probes: AtomicUsize,
    failing: AtomicBool,
    stalled: AtomicBool,
    send_stalled: AtomicBool,
}

impl MockSocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every subsequent send and probe fail as if the peer vanished.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes probes hang until the caller's deadline fires.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Makes sends hang like a peer that stopped reading.
    pub fn set_send_stalled(&self, stalled: bool) {
        self.send_stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason.lock().unwrap().is_some()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientSocket for MockSocket {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.send_stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.frames.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn close(&self, reason: &str) {
        *self.close_reason.lock().unwrap() = Some(reason.to_string());
    }
}
