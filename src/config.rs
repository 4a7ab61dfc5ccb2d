use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_duration(key: &str, default: &str) -> Duration {
    let raw = env_or(key, default);
    humantime::parse_duration(&raw).unwrap_or_else(|_| {
        humantime::parse_duration(default).expect("default duration string is valid")
    })
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen_addr: String,
    pub num_shards: u32,
    pub health_interval: Duration,
    pub health_timeout: Duration,
    pub health_max_failures: u32,
    pub request_timeout: Duration,
    pub broadcast_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            listen_addr: env_or("TORUA_COORDINATOR_ADDR", "0.0.0.0:8080"),
            num_shards: env_parse("TORUA_NUM_SHARDS", 4),
            health_interval: env_duration("TORUA_HEALTH_INTERVAL", "5s"),
            health_timeout: env_duration("TORUA_HEALTH_TIMEOUT", "2s"),
            health_max_failures: env_parse("TORUA_HEALTH_MAX_FAILURES", 3),
            request_timeout: env_duration("TORUA_REQUEST_TIMEOUT", "5s"),
            broadcast_timeout: env_duration("TORUA_BROADCAST_TIMEOUT", "4s"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub node_addr: String,
    pub listen_addr: String,
    pub coordinator_addr: String,
    pub register_attempts: u32,
    pub register_backoff: Duration,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        let node_id = env::var("TORUA_NODE_ID").context("TORUA_NODE_ID must be set")?;
        if node_id.is_empty() {
            anyhow::bail!("TORUA_NODE_ID must not be empty");
        }
        let node_addr = env::var("TORUA_NODE_ADDR").context("TORUA_NODE_ADDR must be set")?;
        if node_addr.is_empty() {
            anyhow::bail!("TORUA_NODE_ADDR must not be empty");
        }
        let coordinator_addr =
            env::var("TORUA_COORDINATOR_ADDR").context("TORUA_COORDINATOR_ADDR must be set")?;

        let listen_addr =
            env::var("TORUA_NODE_LISTEN").unwrap_or_else(|_| default_listen_addr(&node_addr));

        Ok(Self {
            node_id,
            node_addr,
            listen_addr,
            coordinator_addr,
            register_attempts: env_parse("TORUA_REGISTER_ATTEMPTS", 10),
            register_backoff: env_duration("TORUA_REGISTER_BACKOFF", "500ms"),
        })
    }
}

/// Derives a local bind address from the node's public address when
/// `TORUA_NODE_LISTEN` isn't set explicitly: same port, all interfaces.
fn default_listen_addr(node_addr: &str) -> String {
    let port = node_addr
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8081);
    format!("0.0.0.0:{port}")
}
