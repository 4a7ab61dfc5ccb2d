//! Cluster membership: who has registered, and the round-robin shard
//! placement policy that runs whenever membership changes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::coordinator::registry::ShardRegistry;
use crate::coordinator::supervisor::OnUnhealthy;
use crate::error::{AppError, AppResult};
use crate::types::{NodeInfo, NodeStatus};

pub struct MembershipManager {
    nodes: RwLock<HashMap<String, NodeInfo>>,
    registry: Arc<ShardRegistry>,
}

impl MembershipManager {
    pub fn new(registry: Arc<ShardRegistry>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            registry,
        }
    }

    /// Registers a node, or updates its address if it was already known.
    /// Status is left untouched on re-registration; a node that was marked
    /// unhealthy does not silently reset just by registering again. A
    /// first-time registration triggers `auto_assign` under the same write
    /// lock, so shard placement always accounts for the newest member
    /// before any other request can observe it.
    pub fn register(&self, node_id: impl Into<String>, address: impl Into<String>) -> AppResult<NodeInfo> {
        let node_id = node_id.into();
        let address = address.into();
        if node_id.is_empty() || address.is_empty() {
            return Err(AppError::Validation("node id and address must not be empty".to_string()));
        }

        let mut nodes = self.nodes.write().expect("membership lock poisoned");
        let is_new = !nodes.contains_key(&node_id);
        let info = nodes
            .entry(node_id.clone())
            .and_modify(|n| n.address = address.clone())
            .or_insert_with(|| NodeInfo::new(node_id, address));
        let result = info.clone();

        if is_new {
            self.auto_assign_locked(&nodes);
        }
        Ok(result)
    }

    pub fn list_nodes(&self) -> Vec<NodeInfo> {
        let nodes = self.nodes.read().expect("membership lock poisoned");
        let mut list: Vec<NodeInfo> = nodes.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn get_node(&self, node_id: &str) -> Option<NodeInfo> {
        let nodes = self.nodes.read().expect("membership lock poisoned");
        nodes.get(node_id).cloned()
    }

    /// Marks a node unhealthy. Called off the health supervisor's
    /// healthy -> unhealthy edge; never invoked directly by request
    /// handlers.
    pub fn mark_unhealthy(&self, node_id: &str) {
        let mut nodes = self.nodes.write().expect("membership lock poisoned");
        if let Some(node) = nodes.get_mut(node_id) {
            node.status = NodeStatus::Unhealthy;
            node.last_health_check = Some(Utc::now());
        }
    }

    /// Snapshot handed to `HealthSupervisor::start` so the probe loop
    /// always sees the current membership without holding this manager's
    /// lock across a tick.
    pub fn snapshot_for_supervisor(&self) -> Vec<NodeInfo> {
        self.list_nodes()
    }

    fn healthy_ids(nodes: &HashMap<String, NodeInfo>) -> Vec<String> {
        let mut ids: Vec<String> = nodes
            .values()
            .filter(|n| n.status != NodeStatus::Unhealthy)
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn auto_assign_locked(&self, nodes: &HashMap<String, NodeInfo>) {
        let healthy = Self::healthy_ids(nodes);
        if healthy.is_empty() {
            return;
        }
        if self.registry.rebalance(&healthy).is_ok() {
            info!(node_count = healthy.len(), "shards rebalanced across healthy nodes");
        }
    }

    /// Recomputes the full shard placement as a round-robin over every node
    /// not currently marked unhealthy. A cluster with no healthy nodes is
    /// left with whatever placement already existed; there is nothing sane
    /// to rebalance onto.
    pub fn auto_assign(&self) {
        let nodes = self.nodes.read().expect("membership lock poisoned");
        self.auto_assign_locked(&nodes);
    }
}

/// Bridges `HealthSupervisor`'s unhealthy callback back into membership and
/// placement: mark the node down, then rebalance shards onto whoever is
/// left. Shards previously hosted by the failed node are not explicitly
/// unassigned first; `rebalance` overwrites every assignment in one pass so
/// the intermediate state is never observable.
pub struct MembershipCallback {
    pub membership: Arc<MembershipManager>,
}

#[async_trait]
impl OnUnhealthy for MembershipCallback {
    async fn call(&self, node_id: &str) {
        self.membership.mark_unhealthy(node_id);
        self.membership.auto_assign();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_membership(num_shards: u32) -> (MembershipManager, Arc<ShardRegistry>) {
        let registry = Arc::new(ShardRegistry::new(num_shards));
        (MembershipManager::new(Arc::clone(&registry)), registry)
    }

    #[test]
    fn register_is_idempotent_and_updates_address() {
        let (membership, _registry) = new_membership(4);
        membership.register("n1", "127.0.0.1:9001").unwrap();
        membership.register("n1", "127.0.0.1:9002").unwrap();
        let node = membership.get_node("n1").unwrap();
        assert_eq!(node.address, "127.0.0.1:9002");
        assert_eq!(membership.list_nodes().len(), 1);
    }

    #[test]
    fn register_rejects_empty_fields() {
        let (membership, _registry) = new_membership(4);
        assert!(membership.register("", "addr").is_err());
        assert!(membership.register("n1", "").is_err());
    }

    #[test]
    fn first_registration_triggers_auto_assign() {
        let (membership, registry) = new_membership(4);
        membership.register("n1", "addr").unwrap();
        assert_eq!(registry.get_node_shards("n1").len(), 4);
    }

    #[test]
    fn mark_unhealthy_updates_status() {
        let (membership, _registry) = new_membership(4);
        membership.register("n1", "addr").unwrap();
        membership.mark_unhealthy("n1");
        assert_eq!(membership.get_node("n1").unwrap().status, NodeStatus::Unhealthy);
    }

    #[test]
    fn re_registering_does_not_clear_unhealthy_status() {
        let (membership, _registry) = new_membership(4);
        membership.register("n1", "addr").unwrap();
        membership.mark_unhealthy("n1");
        membership.register("n1", "addr2").unwrap();
        assert_eq!(membership.get_node("n1").unwrap().status, NodeStatus::Unhealthy);
    }

    #[test]
    fn auto_assign_excludes_unhealthy_nodes() {
        let (membership, registry) = new_membership(4);
        membership.register("n1", "a1").unwrap();
        membership.register("n2", "a2").unwrap();
        membership.mark_unhealthy("n2");

        membership.auto_assign();

        assert_eq!(registry.get_node_shards("n2").len(), 0);
        assert_eq!(registry.get_node_shards("n1").len(), 4);
    }

    #[test]
    fn auto_assign_is_a_noop_with_no_healthy_nodes() {
        let (membership, registry) = new_membership(4);
        membership.register("n1", "a1").unwrap();
        membership.mark_unhealthy("n1");

        membership.auto_assign();

        // n1 still owns every shard from its own registration-time assign;
        // with no healthy nodes left there is nothing to rebalance onto.
        assert_eq!(registry.get_node_shards("n1").len(), 4);
    }
}
