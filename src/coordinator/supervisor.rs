//! Background liveness probing of every node in the cluster: one
//! independent task that wakes on a ticker, probes the current membership
//! snapshot, and calls back on the healthy -> unhealthy edge exactly once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::{normalize_address, NodeInfo, NodeStatus};

/// Per-node liveness state kept privately by the supervisor; not the same
/// as the membership-level `NodeInfo.status` (see `MembershipManager`).
#[derive(Debug, Clone)]
pub struct NodeHealth {
    pub node_id: String,
    pub status: NodeStatus,
    pub last_check: Option<chrono::DateTime<Utc>>,
    pub last_healthy: Option<chrono::DateTime<Utc>>,
    pub consecutive_fails: u32,
}

impl NodeHealth {
    fn new(node_id: String) -> Self {
        Self {
            node_id,
            status: NodeStatus::Unknown,
            last_check: None,
            last_healthy: None,
            consecutive_fails: 0,
        }
    }
}

/// Invoked exactly once per healthy -> unhealthy transition, off the
/// supervisor's critical section (never called while a lock is held).
#[async_trait]
pub trait OnUnhealthy: Send + Sync {
    async fn call(&self, node_id: &str);
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorParams {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_failures: u32,
}

/// Supplies the current membership snapshot each tick. A plain sync
/// closure is enough since `MembershipManager` uses a synchronous lock.
pub type SnapshotFn = Arc<dyn Fn() -> Vec<NodeInfo> + Send + Sync>;

pub struct HealthSupervisor {
    params: SupervisorParams,
    health: RwLock<HashMap<String, NodeHealth>>,
    client: reqwest::Client,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthSupervisor {
    pub fn new(params: SupervisorParams, client: reqwest::Client) -> Self {
        Self {
            params,
            health: RwLock::new(HashMap::new()),
            client,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Spawns the probe loop. `snapshot` is called once per tick to obtain
    /// the current node list; `on_unhealthy` fires once per edge.
    pub async fn start(self: &Arc<Self>, snapshot: SnapshotFn, on_unhealthy: Arc<dyn OnUnhealthy>) {
        let this = Arc::clone(self);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.params.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.probe_tick(&snapshot, &on_unhealthy).await;
                    }
                }
            }
        });

        *self.task.lock().await = Some(handle);
    }

    async fn probe_tick(&self, snapshot: &SnapshotFn, on_unhealthy: &Arc<dyn OnUnhealthy>) {
        let nodes = snapshot();
        self.purge_absent(&nodes);

        let probes = nodes.into_iter().map(|node| {
            let client = self.client.clone();
            let timeout = self.params.timeout;
            async move {
                let healthy = probe_once(&client, &node.address, timeout).await;
                (node.id, healthy)
            }
        });

        let results = join_all(probes).await;

        for (node_id, healthy) in results {
            self.record_probe_result(&node_id, healthy, on_unhealthy).await;
        }
    }

    fn purge_absent(&self, nodes: &[NodeInfo]) {
        let present: std::collections::HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let mut health = self.health.write().expect("supervisor lock poisoned");
        health.retain(|id, _| present.contains(id.as_str()));
    }

    async fn record_probe_result(&self, node_id: &str, healthy: bool, on_unhealthy: &Arc<dyn OnUnhealthy>) {
        let now = Utc::now();
        let crossed_threshold = {
            let mut health_map = self.health.write().expect("supervisor lock poisoned");
            let entry = health_map
                .entry(node_id.to_string())
                .or_insert_with(|| NodeHealth::new(node_id.to_string()));

            entry.last_check = Some(now);

            if healthy {
                let was_unhealthy = entry.status == NodeStatus::Unhealthy;
                entry.status = NodeStatus::Healthy;
                entry.consecutive_fails = 0;
                entry.last_healthy = Some(now);
                if was_unhealthy {
                    info!(node_id, "node recovered");
                }
                false
            } else {
                entry.consecutive_fails += 1;
                let was_below = entry.consecutive_fails - 1 < self.params.max_failures;
                let now_at_or_above = entry.consecutive_fails >= self.params.max_failures;
                let crossing = was_below && now_at_or_above && entry.status != NodeStatus::Unhealthy;
                if crossing {
                    entry.status = NodeStatus::Unhealthy;
                    warn!(node_id, fails = entry.consecutive_fails, "node marked unhealthy");
                }
                crossing
            }
        };

        if crossed_threshold {
            // Fire off the supervisor's critical section, never while a lock is held.
            on_unhealthy.call(node_id).await;
        }
    }

    pub fn get_node_health(&self, node_id: &str) -> Option<NodeHealth> {
        let health = self.health.read().expect("supervisor lock poisoned");
        health.get(node_id).cloned()
    }

    pub fn get_all_node_health(&self) -> Vec<NodeHealth> {
        let health = self.health.read().expect("supervisor lock poisoned");
        health.values().cloned().collect()
    }

    /// Cancels the probe loop and waits for it to finish. No probe outlives
    /// this call returning.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn probe_once(client: &reqwest::Client, address: &str, timeout: Duration) -> bool {
    let base = normalize_address(address);
    let url = if base.ends_with("/health") {
        base
    } else {
        format!("{base}/health")
    };

    match client.get(&url).timeout(timeout).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingCallback(Arc<AtomicU32>);

    #[async_trait]
    impl OnUnhealthy for CountingCallback {
        async fn call(&self, _node_id: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn params(max_failures: u32) -> SupervisorParams {
        SupervisorParams {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
            max_failures,
        }
    }

    #[tokio::test]
    async fn fires_callback_exactly_once_per_edge() {
        let count = Arc::new(AtomicU32::new(0));
        let callback: Arc<dyn OnUnhealthy> = Arc::new(CountingCallback(Arc::clone(&count)));
        let supervisor = HealthSupervisor::new(params(3), reqwest::Client::new());

        for _ in 0..3 {
            supervisor.record_probe_result("n1", false, &callback).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Further failures on an already-unhealthy node must not re-fire.
        supervisor.record_probe_result("n1", false, &callback).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovery_resets_counter_without_callback() {
        let count = Arc::new(AtomicU32::new(0));
        let callback: Arc<dyn OnUnhealthy> = Arc::new(CountingCallback(Arc::clone(&count)));
        let supervisor = HealthSupervisor::new(params(3), reqwest::Client::new());

        for _ in 0..3 {
            supervisor.record_probe_result("n1", false, &callback).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);

        supervisor.record_probe_result("n1", true, &callback).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let health = supervisor.get_node_health("n1").unwrap();
        assert_eq!(health.status, NodeStatus::Healthy);
        assert_eq!(health.consecutive_fails, 0);
    }

    #[tokio::test]
    async fn purge_removes_nodes_absent_from_snapshot() {
        let count = Arc::new(AtomicU32::new(0));
        let callback: Arc<dyn OnUnhealthy> = Arc::new(CountingCallback(count));
        let supervisor = HealthSupervisor::new(params(3), reqwest::Client::new());
        supervisor.record_probe_result("n1", true, &callback).await;
        assert!(supervisor.get_node_health("n1").is_some());

        supervisor.purge_absent(&[]);
        assert!(supervisor.get_node_health("n1").is_none());
    }
}
