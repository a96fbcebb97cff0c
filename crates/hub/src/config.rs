// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Hub daemon: bridges local devices to a Hearth gateway.
#[derive(Debug, Parser)]
#[command(name = "hearth", version, about)]
pub struct Config {
    /// Gateway HTTP base URL, used for the cold-start registration handshake.
    #[arg(long, env = "HEARTH_GATEWAY_URL", default_value = "http://127.0.0.1:9700")]
    pub gateway_url: String,

    /// Gateway broker WebSocket URL. Discovered via registration when empty.
    #[arg(long, env = "HEARTH_BROKER_URL", default_value = "")]
    pub broker_url: String,

    /// Gateway public key (Z85, 40 chars). Empty on first run triggers
    /// auto-registration against the gateway.
    #[arg(long, env = "HEARTH_GATEWAY_KEY", default_value = "")]
    pub gateway_key: String,

    /// Stable hub identity.
    #[arg(long, env = "HEARTH_HUB_ID")]
    pub hub_id: String,

    /// Human-readable hub name. Defaults to the hub id.
    #[arg(long, env = "HEARTH_HUB_NAME")]
    pub name: Option<String>,

    /// Product key printed on the enclosure (claim secret).
    #[arg(long, env = "HEARTH_PRODUCT_KEY")]
    pub product_key: String,

    /// Hub keypair file. Generated when missing.
    #[arg(long, env = "HEARTH_KEY_FILE", default_value = "hearth-keys.json")]
    pub key_file: PathBuf,

    /// Discovery state file (gateway key + broker endpoint learned at
    /// registration).
    #[arg(long, env = "HEARTH_STATE_FILE", default_value = "hearth-state.json")]
    pub state_file: PathBuf,

    /// Device inventory JSON file.
    #[arg(long, env = "HEARTH_DEVICES")]
    pub devices: PathBuf,

    /// Heartbeat interval in seconds (worker → broker).
    #[arg(long, env = "HEARTH_HEARTBEAT_SECS", default_value_t = 45)]
    pub heartbeat_secs: u64,

    /// Broker liveness window in seconds. The worker reconnects when the
    /// broker has been silent for longer than this.
    #[arg(long, env = "HEARTH_LIVENESS_SECS", default_value_t = 90)]
    pub liveness_secs: u64,

    /// Initial reconnect delay in seconds.
    #[arg(long, env = "HEARTH_RECONNECT_INITIAL_SECS", default_value_t = 10)]
    pub reconnect_initial_secs: u64,

    /// Reconnect delay ceiling in seconds.
    #[arg(long, env = "HEARTH_RECONNECT_MAX_SECS", default_value_t = 60)]
    pub reconnect_max_secs: u64,

    /// Nonce cache capacity per device.
    #[arg(long, env = "HEARTH_NONCE_CAPACITY", default_value_t = 50)]
    pub nonce_capacity: usize,

    /// Nonce cache entry TTL in seconds.
    #[arg(long, env = "HEARTH_NONCE_TTL_SECS", default_value_t = 3600)]
    pub nonce_ttl_secs: u64,

    /// Nonce cache sweep interval in seconds.
    #[arg(long, env = "HEARTH_NONCE_SWEEP_SECS", default_value_t = 600)]
    pub nonce_sweep_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "HEARTH_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HEARTH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hub_id.is_empty() {
            anyhow::bail!("--hub-id must not be empty");
        }
        if self.product_key.is_empty() {
            anyhow::bail!("--product-key must not be empty");
        }
        if !self.gateway_key.is_empty() && !hearth_proto::keys::is_valid_public_key(&self.gateway_key)
        {
            anyhow::bail!("--gateway-key is not a valid Z85 public key");
        }
        // Without a broker endpoint we need the gateway URL to discover one.
        if self.broker_url.is_empty() && self.gateway_url.is_empty() {
            anyhow::bail!("either --broker-url or --gateway-url must be specified");
        }
        if self.log_format != "json" && self.log_format != "text" {
            anyhow::bail!("invalid log format: {}", self.log_format);
        }
        Ok(())
    }

    /// Effective hub display name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.hub_id)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_secs)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_secs(self.reconnect_initial_secs)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }

    pub fn nonce_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.nonce_sweep_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
