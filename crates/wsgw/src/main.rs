//! The gateway binary: configuration from the environment, one instance,
//! graceful shutdown on SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use wsgw_cluster::{ClusterRouter, RedisBus};
use wsgw_core::{ConnectionRegistry, random_minter};
use wsgw_runtime::{GatewayConfig, GatewayServer, logging};
use wsgw_transport::BackendClient;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    let registry = Arc::new(ConnectionRegistry::new());
    let backend = Arc::new(BackendClient::new(&config.app_base_url));

    let cluster = match config.redis_url() {
        Some(url) => {
            let sink = ClusterRouter::delivery_sink(Arc::clone(&registry));
            let bus = RedisBus::connect(&url, sink)
                .await
                .context("failed to connect to the cluster bus")?;
            Some(Arc::new(ClusterRouter::new(Arc::new(bus))))
        }
        None => None,
    };

    let gateway = GatewayServer::start(config, registry, backend, cluster, random_minter())
        .await
        .context("failed to start the gateway")?;

    wait_for_shutdown().await;
    info!("signal received, stopping gateway");
    gateway.shutdown().await;
    info!("gateway stopped");

    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received Ctrl+C");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C");
    }
}
