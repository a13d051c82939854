//! Shared key-value store used for cross-node group and liveness records.

use crate::error::RelayError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Set-oriented store shared by all nodes of a cluster.
///
/// Semantics follow the usual key-value server conventions: an emptied set
/// disappears, adding to a set keeps its expiry, and expiring a missing
/// key reports `false`.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Adds `member` to the set at `key`. Returns `true` if it was new.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, RelayError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, RelayError>;

    /// Removes `member` from the set at `key`. Returns `true` if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, RelayError>;

    /// Deletes `key`. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, RelayError>;

    /// Sets `key` to expire after `ttl`. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, RelayError>;

    async fn cardinality(&self, key: &str) -> Result<usize, RelayError>;
}

#[derive(Debug, Default)]
struct Entry {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`SharedStore`] with lazy expiry.
///
/// Can be switched offline to exercise backend-failure paths.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    online: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            online: AtomicBool::new(true),
        }
    }

    /// When offline every operation fails with `RelayError::Backend`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    /// Remaining lifetime of `key`, if it exists and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn check_online(&self) -> Result<(), RelayError> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RelayError::Backend("shared store unavailable".to_string()))
        }
    }

    fn purge_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, RelayError> {
        self.check_online()?;
        self.purge_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_default();
        Ok(entry.members.insert(member.to_string()))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, RelayError> {
        self.check_online()?;
        self.purge_if_expired(key);
        let mut members: Vec<String> = self
            .entries
            .get(key)
            .map(|entry| entry.members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, RelayError> {
        self.check_online()?;
        self.purge_if_expired(key);
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => entry.members.remove(member),
            None => false,
        };
        self.entries.remove_if(key, |_, entry| entry.members.is_empty());
        Ok(removed)
    }

    async fn delete(&self, key: &str) -> Result<bool, RelayError> {
        self.check_online()?;
        self.purge_if_expired(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, RelayError> {
        self.check_online()?;
        self.purge_if_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cardinality(&self, key: &str) -> Result<usize, RelayError> {
        self.check_online()?;
        self.purge_if_expired(key);
        Ok(self.entries.get(key).map(|entry| entry.members.len()).unwrap_or(0))
    }
}
