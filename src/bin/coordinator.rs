use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use torua::config::CoordinatorConfig;
use torua::coordinator::{
    router, CoordinatorState, HealthSupervisor, MembershipCallback, MembershipManager,
    RouterConfig, ShardRegistry, SupervisorParams,
};
use torua::http_client::build_client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = CoordinatorConfig::from_env()?;
    let client = build_client();

    let registry = Arc::new(ShardRegistry::new(cfg.num_shards));
    let membership = Arc::new(MembershipManager::new(Arc::clone(&registry)));
    let supervisor = Arc::new(HealthSupervisor::new(
        SupervisorParams {
            interval: cfg.health_interval,
            timeout: cfg.health_timeout,
            max_failures: cfg.health_max_failures,
        },
        client.clone(),
    ));

    let snapshot_membership = Arc::clone(&membership);
    supervisor
        .start(
            Arc::new(move || snapshot_membership.snapshot_for_supervisor()),
            Arc::new(MembershipCallback {
                membership: Arc::clone(&membership),
            }),
        )
        .await;

    let state = CoordinatorState {
        registry,
        membership,
        supervisor: Arc::clone(&supervisor),
        client,
        config: RouterConfig {
            request_timeout: cfg.request_timeout,
            broadcast_timeout: cfg.broadcast_timeout,
        },
    };

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!(addr = %cfg.listen_addr, num_shards = cfg.num_shards, "coordinator listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining");
}
