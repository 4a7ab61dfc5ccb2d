//! Node-side registration: announce this node to the coordinator at
//! start-up, retrying with a fixed backoff until accepted or the attempt
//! budget is exhausted.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::NodeConfig;

#[derive(Serialize)]
struct RegisterRequest<'a> {
    node: RegisterNode<'a>,
}

#[derive(Serialize)]
struct RegisterNode<'a> {
    id: &'a str,
    addr: &'a str,
}

/// Posts this node's identity to the coordinator, retrying up to
/// `cfg.register_attempts` times with `cfg.register_backoff` between
/// attempts. Returns an error once the budget is exhausted; the caller
/// treats that as fatal and exits the process, per the node start-up
/// contract.
pub async fn register_with_coordinator(
    cfg: &NodeConfig,
    client: &reqwest::Client,
) -> anyhow::Result<()> {
    let url = format!("{}/register", cfg.coordinator_addr.trim_end_matches('/'));
    let body = RegisterRequest {
        node: RegisterNode {
            id: &cfg.node_id,
            addr: &cfg.node_addr,
        },
    };

    let mut last_error: Option<String> = None;

    for attempt in 1..=cfg.register_attempts {
        match client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(attempt, "registered with coordinator at {url}");
                return Ok(());
            }
            Ok(resp) => {
                let status = resp.status();
                warn!(attempt, %status, "coordinator rejected registration");
                last_error = Some(format!("coordinator returned {status}"));
            }
            Err(err) => {
                warn!(attempt, error = %err, "failed to reach coordinator");
                last_error = Some(err.to_string());
            }
        }

        if attempt < cfg.register_attempts {
            tokio::time::sleep(cfg.register_backoff).await;
        }
    }

    anyhow::bail!(
        "failed to register with coordinator after {} attempts: {}",
        cfg.register_attempts,
        last_error.unwrap_or_else(|| "unknown error".to_string())
    )
}
