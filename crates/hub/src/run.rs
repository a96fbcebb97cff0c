// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub daemon orchestration: keys, inventory, discovery, then the worker
//! session loop until shutdown.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hearth_proto::keys::KeyPair;

use crate::config::Config;
use crate::devices;
use crate::driver::DriverRegistry;
use crate::handlers::HubState;
use crate::nonce_cache::{self, NonceCache};
use crate::registration::{self, Discovery, RegisterRequest};
use crate::worker::{self, WorkerOptions};

/// Run the hub daemon until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    // Crypto provider for reqwest/rustls.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let keys = load_or_generate_keys(&config.key_file)?;
    let inventory = devices::load_inventory(&config.devices)?;
    info!(hub_id = %config.hub_id, devices = inventory.len(), "loaded device inventory");

    let discovery = resolve_discovery(&config, &keys).await?;

    let drivers = DriverRegistry::from_inventory(&inventory);
    let cache = NonceCache::new(config.nonce_capacity, config.nonce_ttl());
    let state = Arc::new(HubState::new(config.hub_id.clone(), inventory, drivers, cache));

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

    nonce_cache::spawn_sweeper(
        Arc::clone(&state.cache),
        config.nonce_sweep_interval(),
        shutdown.clone(),
    );

    let opts = WorkerOptions {
        broker_url: discovery.broker_url,
        hub_id: config.hub_id.clone(),
        public_key: Some(keys.public_key),
        heartbeat: config.heartbeat_interval(),
        liveness: config.liveness_window(),
        reconnect_initial: config.reconnect_initial(),
        reconnect_max: config.reconnect_max(),
    };
    worker::run(state, opts, shutdown).await;
    Ok(())
}

/// Resolve the gateway key and broker endpoint: configuration first, then
/// persisted discovery, then the registration handshake.
async fn resolve_discovery(config: &Config, keys: &KeyPair) -> anyhow::Result<Discovery> {
    if !config.gateway_key.is_empty() && !config.broker_url.is_empty() {
        return Ok(Discovery {
            server_public_key: config.gateway_key.clone(),
            broker_url: config.broker_url.clone(),
        });
    }

    if let Ok(persisted) = registration::load(&config.state_file) {
        info!(broker = %persisted.broker_url, "using persisted gateway discovery");
        return Ok(persisted);
    }

    let request = RegisterRequest {
        hub_id: config.hub_id.clone(),
        public_key: keys.public_key.clone(),
        name: config.display_name().to_owned(),
        product_key: config.product_key.clone(),
    };
    let discovery = registration::register(&config.gateway_url, &request).await?;
    if let Err(e) = registration::save(&config.state_file, &discovery) {
        warn!(err = %e, "failed to persist discovery state");
    }
    Ok(discovery)
}

/// Load the hub keypair, generating and persisting one when missing.
fn load_or_generate_keys(path: &Path) -> anyhow::Result<KeyPair> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        let keys: KeyPair = serde_json::from_str(&contents)?;
        return Ok(keys);
    }
    let keys = KeyPair::generate().map_err(|e| anyhow::anyhow!("key generation failed: {e}"))?;
    let json = serde_json::to_string_pretty(&keys)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    info!(path = %path.display(), "generated hub keypair");
    Ok(keys)
}
