//! Local group index: group key ↔ member client identifiers.
//!
//! The index is a plain data structure. It lives inside the connection
//! registry's lock so that joins and connection removal are serialized.

use crate::token::ClientId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct GroupIndex {
    members: HashMap<String, HashSet<ClientId>>,
    memberships: HashMap<ClientId, HashSet<String>>,
}

impl GroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `client` to `group`. Returns `false` if it was already a member.
    pub fn insert(&mut self, group: &str, client: &ClientId) -> bool {
        let added = self
            .members
            .entry(group.to_string())
            .or_default()
            .insert(client.clone());
        self.memberships
            .entry(client.clone())
            .or_default()
            .insert(group.to_string());
        added
    }

    /// Removes `client` from every group and returns the groups it left.
    pub fn remove_client(&mut self, client: &ClientId) -> Vec<String> {
        let groups = self.memberships.remove(client).unwrap_or_default();
        for group in &groups {
            if let Some(set) = self.members.get_mut(group) {
                set.remove(client);
                if set.is_empty() {
                    self.members.remove(group);
                }
            }
        }
        let mut groups: Vec<String> = groups.into_iter().collect();
        groups.sort();
        groups
    }

    pub fn members(&self, group: &str) -> Vec<ClientId> {
        self.members
            .get(group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}
