// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::broker::BrokerSettings;

/// Configuration for the hearthgate gateway.
#[derive(Debug, Clone, Parser)]
#[command(name = "hearthgate", version, about = "Hearth IoT gateway")]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "HEARTHGATE_HOST")]
    pub host: String,

    /// Port to listen on (HTTP and the worker WebSocket).
    #[arg(long, default_value_t = 9700, env = "HEARTHGATE_PORT")]
    pub port: u16,

    /// Bearer token for HTTP API auth. If unset, auth is disabled.
    #[arg(long, env = "HEARTHGATE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Broker WebSocket URL advertised to registering hubs. Defaults to
    /// `ws://<host>:<port>/ws/worker`.
    #[arg(long, env = "HEARTHGATE_ADVERTISED_URL")]
    pub advertised_url: Option<String>,

    /// Path to the gateway key file. Generated when missing.
    #[arg(long, default_value = "hearthgate-keys.json", env = "HEARTHGATE_KEY_FILE")]
    pub key_file: PathBuf,

    /// Worker liveness window in seconds.
    #[arg(long, default_value_t = 75, env = "HEARTHGATE_LIVENESS_SECS")]
    pub liveness_secs: u64,

    /// Broker → worker heartbeat interval in seconds.
    #[arg(long, default_value_t = 15, env = "HEARTHGATE_HEARTBEAT_SECS")]
    pub heartbeat_secs: u64,

    /// Default deadline for awaited requests in seconds.
    #[arg(long, default_value_t = 30, env = "HEARTHGATE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Monitor sweep interval in seconds (hub status reconciliation).
    #[arg(long, default_value_t = 30, env = "HEARTHGATE_MONITOR_SECS")]
    pub monitor_secs: u64,

    /// Service registry staleness cutoff in seconds.
    #[arg(long, default_value_t = 300, env = "HEARTHGATE_REGISTRY_STALE_SECS")]
    pub registry_stale_secs: u64,

    /// Cap on concurrently processed HTTP requests. Unset = unlimited.
    #[arg(long, env = "HEARTHGATE_MAX_CONCURRENT_REQUESTS")]
    pub max_concurrent_requests: Option<usize>,

    /// Log format (json or text).
    #[arg(long, env = "HEARTHGATE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HEARTHGATE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl GatewayConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_secs)
    }

    pub fn registry_stale(&self) -> Duration {
        Duration::from_secs(self.registry_stale_secs)
    }

    /// Broker endpoint handed to registering hubs.
    pub fn broker_url(&self) -> String {
        match &self.advertised_url {
            Some(url) => url.clone(),
            None => format!("ws://{}:{}/ws/worker", self.host, self.port),
        }
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            liveness_window: self.liveness_window(),
            heartbeat_interval: self.heartbeat_interval(),
            default_timeout: self.request_timeout(),
        }
    }
}
