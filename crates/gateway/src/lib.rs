// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hearthgate: the cloud-side gateway. Hosts the broker workers connect
//! to, the hub directory, and the HTTP surface that turns user requests
//! into device commands.

pub mod broker;
pub mod config;
pub mod error;
pub mod keys;
pub mod registry;
pub mod repository;
pub mod service;
pub mod state;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GatewayConfig;
use crate::registry::ServiceRegistry;
use crate::repository::{MemoryRepository, Repository};
use crate::state::GatewayState;
use crate::transport::build_router;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let state = build_state(config, repo, shutdown.clone())?;
    service::spawn_monitor(Arc::clone(&state), shutdown.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("hearthgate listening on {addr}");
    let router = build_router(state);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Assemble gateway state: key material, broker loop, service registry.
///
/// Split out so tests can host the gateway in-process on an ephemeral port.
pub fn build_state(
    config: GatewayConfig,
    repo: Arc<dyn Repository>,
    shutdown: CancellationToken,
) -> anyhow::Result<Arc<GatewayState>> {
    let keys = keys::load_or_generate(&config.key_file)?;
    let broker = broker::spawn(config.broker_settings(), shutdown.clone());
    let registry = ServiceRegistry::new(config.registry_stale(), config.liveness_window());
    Ok(Arc::new(GatewayState { config, repo, broker, registry, keys, shutdown }))
}
