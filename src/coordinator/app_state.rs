//! Shared state handed to every coordinator request handler.

use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::membership::MembershipManager;
use crate::coordinator::registry::ShardRegistry;
use crate::coordinator::supervisor::HealthSupervisor;

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub request_timeout: Duration,
    pub broadcast_timeout: Duration,
}

#[derive(Clone)]
pub struct CoordinatorState {
    pub registry: Arc<ShardRegistry>,
    pub membership: Arc<MembershipManager>,
    pub supervisor: Arc<HealthSupervisor>,
    pub client: reqwest::Client,
    pub config: RouterConfig,
}
