//! Authoritative `{shard -> node}` placement map.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::hashing::shard_for_key;
use crate::types::ShardAssignment;

pub struct ShardRegistry {
    num_shards: u32,
    assignments: RwLock<HashMap<u32, ShardAssignment>>,
}

impl ShardRegistry {
    pub fn new(num_shards: u32) -> Self {
        Self {
            num_shards,
            assignments: RwLock::new(HashMap::new()),
        }
    }

    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    fn check_shard_id(&self, shard_id: u32) -> AppResult<()> {
        if shard_id >= self.num_shards {
            return Err(AppError::Validation(format!(
                "shard id {shard_id} out of range [0, {})",
                self.num_shards
            )));
        }
        Ok(())
    }

    /// Overwrites any existing assignment for `shard_id`.
    pub fn assign(&self, shard_id: u32, node_id: impl Into<String>, is_primary: bool) -> AppResult<()> {
        self.check_shard_id(shard_id)?;
        let node_id = node_id.into();
        if node_id.is_empty() {
            return Err(AppError::Validation("node id must not be empty".to_string()));
        }

        let mut assignments = self.assignments.write().expect("registry lock poisoned");
        assignments.insert(
            shard_id,
            ShardAssignment {
                shard_id,
                node_id,
                is_primary,
            },
        );
        Ok(())
    }

    /// Idempotent: unassigning an already-unassigned shard is not an error.
    pub fn unassign(&self, shard_id: u32) -> AppResult<()> {
        self.check_shard_id(shard_id)?;
        let mut assignments = self.assignments.write().expect("registry lock poisoned");
        assignments.remove(&shard_id);
        Ok(())
    }

    pub fn get_assignment(&self, shard_id: u32) -> Option<ShardAssignment> {
        let assignments = self.assignments.read().expect("registry lock poisoned");
        assignments.get(&shard_id).cloned()
    }

    pub fn get_all_assignments(&self) -> Vec<ShardAssignment> {
        let assignments = self.assignments.read().expect("registry lock poisoned");
        assignments.values().cloned().collect()
    }

    pub fn get_node_shards(&self, node_id: &str) -> Vec<u32> {
        let assignments = self.assignments.read().expect("registry lock poisoned");
        let mut shards: Vec<u32> = assignments
            .values()
            .filter(|a| a.node_id == node_id)
            .map(|a| a.shard_id)
            .collect();
        shards.sort_unstable();
        shards
    }

    /// Pure function: `FNV1a_32(utf8(key)) mod num_shards`. Bit-exact across
    /// every process in the cluster.
    pub fn shard_for_key(&self, key: &str) -> u32 {
        shard_for_key(key, self.num_shards)
    }

    pub fn node_for_key(&self, key: &str) -> Option<String> {
        let shard_id = self.shard_for_key(key);
        self.get_assignment(shard_id).map(|a| a.node_id)
    }

    /// Round-robins `shard_i -> nodes[i mod len(nodes)]`, overwriting every
    /// existing assignment. Rejects an empty node list.
    pub fn rebalance(&self, nodes: &[String]) -> AppResult<()> {
        if nodes.is_empty() {
            return Err(AppError::Validation(
                "cannot rebalance onto an empty node list".to_string(),
            ));
        }

        let mut assignments = self.assignments.write().expect("registry lock poisoned");
        assignments.clear();
        for shard_id in 0..self.num_shards {
            let node_id = nodes[shard_id as usize % nodes.len()].clone();
            assignments.insert(
                shard_id,
                ShardAssignment {
                    shard_id,
                    node_id,
                    is_primary: true,
                },
            );
        }
        Ok(())
    }
}
