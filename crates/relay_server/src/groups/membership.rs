//! Cluster-aware group membership operations.

use crate::cluster::{group_set_key, ClusterBackend, GROUP_LIST_KEY};
use crate::connection::ConnectionRegistry;
use crate::error::RelayError;
use crate::token::ClientId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Joins, lists and tears down group memberships.
///
/// In single-node mode every operation is answered from the registry's
/// local index. In clustered mode the shared store holds the authoritative
/// cluster-wide member set and the local index mirrors the members that
/// connect through this node.
#[derive(Debug)]
pub struct GroupMembership {
    registry: Arc<ConnectionRegistry>,
    cluster: Option<Arc<ClusterBackend>>,
}

impl GroupMembership {
    pub fn new(registry: Arc<ConnectionRegistry>, cluster: Option<Arc<ClusterBackend>>) -> Self {
        Self { registry, cluster }
    }

    /// Adds a locally connected client to `group`.
    ///
    /// # Errors
    ///
    /// * `ClientNotAlive` - the client is not in this node's registry
    /// * `GroupCapacityExceeded` - clustered and the group already holds
    ///   the configured number of members; nothing is recorded
    /// * `Backend` - the shared store failed
    pub async fn join_local(&self, group: &str, id: &ClientId) -> Result<(), RelayError> {
        if self.registry.lookup(id).await.is_none() {
            return Err(RelayError::ClientNotAlive(id.clone()));
        }

        let Some(cluster) = &self.cluster else {
            self.registry.join_local(group, id).await?;
            return Ok(());
        };

        let key = group_set_key(group);
        let limit = cluster.config.group_client_limit;
        let count = cluster.store.cardinality(&key).await?;
        if count >= limit {
            // a member re-joining a full group is not a new member
            let members = cluster.store.set_members(&key).await?;
            if !members.iter().any(|m| m == id.as_str()) {
                warn!("🚫 Group '{}' is full ({} members), refusing {}", group, count, id);
                return Err(RelayError::GroupCapacityExceeded {
                    group: group.to_string(),
                    limit,
                });
            }
        }

        cluster.store.set_add(&key, id.as_str()).await?;
        cluster.store.set_add(GROUP_LIST_KEY, group).await?;

        // the client may have been evicted while the store calls ran
        if let Err(e) = self.registry.join_local(group, id).await {
            if let Err(rollback) = cluster.store.set_remove(&key, id.as_str()).await {
                warn!("⚠️ Failed to roll back membership of {} in '{}': {}", id, group, rollback);
            }
            return Err(e);
        }

        debug!("👥 Client {} joined cluster group '{}' ({} members)", id, group, count + 1);
        Ok(())
    }

    /// Every member of `group`: the shared store's set when clustered,
    /// the local index otherwise.
    pub async fn members_of(&self, group: &str) -> Result<Vec<ClientId>, RelayError> {
        match &self.cluster {
            Some(cluster) => {
                let members = cluster.store.set_members(&group_set_key(group)).await?;
                Ok(members.into_iter().map(ClientId::from).collect())
            }
            None => Ok(self.registry.local_members(group).await),
        }
    }

    /// Members of `group` connected through this node, in either mode.
    pub async fn local_members(&self, group: &str) -> Vec<ClientId> {
        self.registry.local_members(group).await
    }

    /// Removes `id` from the shared set of every group in `groups`.
    ///
    /// Local memberships are already gone by the time this runs: the
    /// registry drops them together with the connection. Store failures
    /// are logged and the remaining groups are still attempted.
    pub async fn leave_all(&self, id: &ClientId, groups: &[String]) {
        let Some(cluster) = &self.cluster else {
            return;
        };
        for group in groups {
            if let Err(e) = cluster.store.set_remove(&group_set_key(group), id.as_str()).await {
                warn!("⚠️ Failed to remove {} from cluster group '{}': {}", id, group, e);
            }
        }
        if !groups.is_empty() {
            info!("👋 Client {} left {} cluster group(s)", id, groups.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MemoryCluster, SharedStore};
    use crate::config::ClusterConfig;
    use crate::connection::ClientConnection;
    use crate::testing::MockSocket;

    async fn registry_with(ids: &[&str]) -> Arc<ConnectionRegistry> {
        let registry = Arc::new(ConnectionRegistry::new());
        for id in ids {
            registry
                .add(ClientConnection::new(ClientId::from(*id), "sys", MockSocket::new()))
                .await
                .unwrap();
        }
        registry
    }

    fn cluster_with_limit(cluster: &MemoryCluster, limit: usize) -> Option<Arc<ClusterBackend>> {
        let config = ClusterConfig {
            group_client_limit: limit,
            ..ClusterConfig::default()
        };
        Some(Arc::new(cluster.backend(config)))
    }

    #[tokio::test]
    async fn test_single_node_join_and_members() {
        let registry = registry_with(&["a", "b"]).await;
        let groups = GroupMembership::new(registry.clone(), None);

        groups.join_local("g", &ClientId::from("a")).await.unwrap();
        groups.join_local("g", &ClientId::from("b")).await.unwrap();

        let mut members = groups.members_of("g").await.unwrap();
        members.sort();
        assert_eq!(members, vec![ClientId::from("a"), ClientId::from("b")]);
    }

    #[tokio::test]
    async fn test_join_of_unknown_client_leaves_no_trace() {
        let cluster = MemoryCluster::new();
        let registry = registry_with(&[]).await;
        let groups = GroupMembership::new(registry.clone(), cluster_with_limit(&cluster, 10));

        let ghost = ClientId::from("ghost");
        assert!(matches!(
            groups.join_local("g", &ghost).await,
            Err(RelayError::ClientNotAlive(_))
        ));
        assert!(groups.members_of("g").await.unwrap().is_empty());
        assert!(registry.local_members("g").await.is_empty());
        assert!(cluster.store.set_members(GROUP_LIST_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_limit_refuses_extra_member() {
        let cluster = MemoryCluster::new();
        let registry = registry_with(&["a", "b", "c"]).await;
        let groups = GroupMembership::new(registry.clone(), cluster_with_limit(&cluster, 2));

        groups.join_local("g", &ClientId::from("a")).await.unwrap();
        groups.join_local("g", &ClientId::from("b")).await.unwrap();
        let err = groups.join_local("g", &ClientId::from("c")).await.unwrap_err();
        assert!(matches!(err, RelayError::GroupCapacityExceeded { limit: 2, .. }));

        // rejoining as an existing member is still allowed
        groups.join_local("g", &ClientId::from("a")).await.unwrap();

        assert_eq!(groups.members_of("g").await.unwrap().len(), 2);
        assert!(!registry.local_members("g").await.contains(&ClientId::from("c")));
    }

    #[tokio::test]
    async fn test_cluster_join_mirrors_to_store() {
        let cluster = MemoryCluster::new();
        let registry = registry_with(&["a"]).await;
        let groups = GroupMembership::new(registry.clone(), cluster_with_limit(&cluster, 10));

        groups.join_local("sys:g", &ClientId::from("a")).await.unwrap();

        assert_eq!(
            cluster.store.set_members(&group_set_key("sys:g")).await.unwrap(),
            vec!["a".to_string()]
        );
        assert_eq!(
            cluster.store.set_members(GROUP_LIST_KEY).await.unwrap(),
            vec!["sys:g".to_string()]
        );
        assert_eq!(groups.local_members("sys:g").await, vec![ClientId::from("a")]);

        let removed = registry.remove(&ClientId::from("a")).await.unwrap();
        groups.leave_all(&ClientId::from("a"), &removed.groups).await;
        assert!(groups.members_of("sys:g").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_backend_error() {
        let cluster = MemoryCluster::new();
        let registry = registry_with(&["a"]).await;
        let groups = GroupMembership::new(registry.clone(), cluster_with_limit(&cluster, 10));

        cluster.store.set_online(false);
        assert!(matches!(
            groups.join_local("g", &ClientId::from("a")).await,
            Err(RelayError::Backend(_))
        ));
        assert!(registry.local_members("g").await.is_empty());
    }
}
