//! Wire-level cluster state types shared by the coordinator and nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness state of a node as tracked by the coordinator.
///
/// A closed three-state sum type, kept off the wire as lowercase strings
/// for compatibility with any non-Rust client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Unknown
    }
}

/// Identity and reachability of one cluster member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    #[serde(rename = "addr")]
    pub address: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl NodeInfo {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            status: NodeStatus::Unknown,
            last_health_check: None,
        }
    }
}

/// One shard-to-node placement record. `is_primary` is always `true` in
/// core: the replica code path is unused, see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardAssignment {
    pub shard_id: u32,
    pub node_id: String,
    pub is_primary: bool,
}

/// Normalizes a node-supplied address into a reachable base URL.
///
/// Nodes may register with `host:port` or a full `scheme://host:port`; the
/// coordinator must tolerate both (spec: "coordinator must tolerate both
/// and normalize"). Trailing slashes are stripped so callers can always
/// append a `/`-prefixed path.
pub fn normalize_address(address: &str) -> String {
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_host_port() {
        assert_eq!(normalize_address("h1:8081"), "http://h1:8081");
    }

    #[test]
    fn leaves_scheme_alone() {
        assert_eq!(normalize_address("https://h1:8081"), "https://h1:8081");
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(normalize_address("http://h1:8081/"), "http://h1:8081");
    }

    #[test]
    fn status_serializes_lowercase() {
        let s = serde_json::to_string(&NodeStatus::Unhealthy).unwrap();
        assert_eq!(s, "\"unhealthy\"");
    }
}
