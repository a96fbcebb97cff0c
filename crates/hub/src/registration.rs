// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cold-start registration handshake.
//!
//! A hub configured without the gateway's public key POSTs itself to the
//! gateway's `/hub/register` endpoint, learns the server key and broker
//! endpoint, and persists both for later runs. Registration is idempotent
//! on the gateway side, so re-running it is safe.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Gateway facts learned at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub server_public_key: String,
    pub broker_url: String,
}

/// Load persisted discovery state.
pub fn load(path: &Path) -> anyhow::Result<Discovery> {
    let contents = std::fs::read_to_string(path)?;
    let discovery: Discovery = serde_json::from_str(&contents)?;
    Ok(discovery)
}

/// Save discovery state atomically (write tmp + rename).
pub fn save(path: &Path, discovery: &Discovery) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(discovery)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Identity the hub presents at registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub hub_id: String,
    pub public_key: String,
    pub name: String,
    pub product_key: String,
}

#[derive(Debug, Deserialize)]
struct RegisterReply {
    server_public_key: String,
    broker_url: String,
}

/// POST `/hub/register`, retrying up to 5 times with doubling backoff.
pub async fn register(gateway_url: &str, request: &RegisterRequest) -> anyhow::Result<Discovery> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_default();
    let base = gateway_url.trim_end_matches('/');
    let url = format!("{base}/hub/register");

    let mut last_err = None;
    for attempt in 0..5u32 {
        match try_register(&client, &url, request).await {
            Ok(discovery) => {
                info!(
                    gateway = %base,
                    hub_id = %request.hub_id,
                    broker = %discovery.broker_url,
                    "registered with gateway"
                );
                return Ok(discovery);
            }
            Err(e) => {
                let delay = std::time::Duration::from_millis(500 * 2u64.pow(attempt));
                debug!(
                    gateway = %base,
                    attempt = attempt + 1,
                    err = %e,
                    "registration attempt failed, retrying in {:?}",
                    delay,
                );
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("registration failed")))
}

async fn try_register(
    client: &reqwest::Client,
    url: &str,
    request: &RegisterRequest,
) -> anyhow::Result<Discovery> {
    let resp = client.post(url).json(request).send().await?.error_for_status()?;
    let reply: RegisterReply = resp.json().await?;
    if reply.broker_url.is_empty() {
        anyhow::bail!("gateway returned an empty broker endpoint");
    }
    Ok(Discovery { server_public_key: reply.server_public_key, broker_url: reply.broker_url })
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod tests;
