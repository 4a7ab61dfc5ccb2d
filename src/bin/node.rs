use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use torua::config::NodeConfig;
use torua::http_client::build_client;
use torua::node::registrar::register_with_coordinator;
use torua::node::{router, NodeState, ShardStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = NodeConfig::from_env()?;
    let client = build_client();

    let state = NodeState {
        node_id: cfg.node_id.clone(),
        store: Arc::new(ShardStore::new()),
    };

    // Start-up order matters: the HTTP server must be accepting connections
    // before this node announces itself, otherwise the coordinator can
    // auto-assign shards to it, or health-probe it, before anything is
    // listening.
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!(node_id = %cfg.node_id, addr = %cfg.listen_addr, "node listening");

    let server = tokio::spawn(async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    if let Err(err) = register_with_coordinator(&cfg, &client).await {
        error!(error = %err, "could not register with coordinator");
        server.abort();
        return Err(err);
    }

    server.await??;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining");
}
