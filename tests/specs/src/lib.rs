// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenarios.
//!
//! Hosts a real gateway on an ephemeral TCP port and connects real hub
//! workers to it over WebSocket, with loopback drivers standing in for
//! devices so tests can count invocations.

use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use hearth::devices::DeviceSpec;
use hearth::driver::loopback::LoopbackDriver;
use hearth::driver::{DeviceDriver, DriverRegistry};
use hearth::handlers::HubState;
use hearth::nonce_cache::NonceCache;
use hearth::worker::{self, WorkerOptions};
use hearth_proto::keys::KeyPair;
use hearth_proto::{Frame, ServiceRequest, ServiceResponse, HUB_CONTROL_SERVICE};
use hearthgate::config::GatewayConfig;
use hearthgate::repository::{HubStatus, Repository};
use hearthgate::state::GatewayState;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// How often wait helpers poll.
const POLL: Duration = Duration::from_millis(50);

// -- Gateway ------------------------------------------------------------------

/// In-process gateway on an ephemeral port, tuned for fast tests:
/// 1 s liveness, 1 s monitor sweep, 3 s request timeout.
pub struct Gateway {
    pub state: Arc<GatewayState>,
    pub base_url: String,
    pub broker_url: String,
    pub shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Gateway {
    pub async fn start() -> anyhow::Result<Self> {
        ensure_crypto();
        let dir = tempfile::tempdir()?;
        let key_file = dir.path().join("keys.json");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let config = GatewayConfig::parse_from([
            "hearthgate",
            "--host",
            "127.0.0.1",
            "--port",
            &port.to_string(),
            "--key-file",
            &key_file.to_string_lossy(),
            "--liveness-secs",
            "1",
            "--heartbeat-secs",
            "1",
            "--monitor-secs",
            "1",
            "--request-timeout-secs",
            "3",
        ]);

        let shutdown = CancellationToken::new();
        let repo: Arc<dyn Repository> =
            Arc::new(hearthgate::repository::MemoryRepository::new());
        let state = hearthgate::build_state(config, repo, shutdown.clone())?;
        hearthgate::service::spawn_monitor(Arc::clone(&state), shutdown.clone());

        let router = hearthgate::transport::build_router(Arc::clone(&state));
        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(serve_shutdown.cancelled_owned())
                .await;
        });

        Ok(Self {
            state,
            base_url: format!("http://127.0.0.1:{port}"),
            broker_url: format!("ws://127.0.0.1:{port}/ws/worker"),
            shutdown,
            _dir: dir,
        })
    }

    pub fn http(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default()
    }

    pub async fn create_user(&self, user_id: &str) -> anyhow::Result<()> {
        self.state
            .repo
            .create_user(user_id, user_id)
            .await
            .map_err(|e| anyhow::anyhow!("create user: {e}"))?;
        Ok(())
    }

    pub async fn wait_hub_status(
        &self,
        hub_id: &str,
        status: HubStatus,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(Some(hub)) = self.state.repo.hub(hub_id).await {
                if hub.status == status {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("hub {hub_id} never reached {status:?}");
            }
            tokio::time::sleep(POLL).await;
        }
    }

    pub async fn wait_device_count(
        &self,
        hub_id: &str,
        count: usize,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(devices) = self.state.repo.devices_for_hub(hub_id).await {
                if devices.len() == count {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("hub {hub_id} never reported {count} devices");
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

// -- Hub ----------------------------------------------------------------------

/// A real hub worker with loopback drivers.
pub struct Hub {
    pub state: Arc<HubState>,
    pub drivers: HashMap<String, Arc<LoopbackDriver>>,
    pub shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Hub {
    /// Cold start: the HTTP registration handshake first (discovering the
    /// broker endpoint), then the worker session.
    pub async fn start(
        gateway: &Gateway,
        hub_id: &str,
        product_key: &str,
        device_ids: &[&str],
    ) -> anyhow::Result<Self> {
        ensure_crypto();
        let keys = KeyPair::generate().map_err(|e| anyhow::anyhow!("keys: {e}"))?;
        let request = hearth::registration::RegisterRequest {
            hub_id: hub_id.to_owned(),
            public_key: keys.public_key.clone(),
            name: hub_id.to_owned(),
            product_key: product_key.to_owned(),
        };
        let discovery = hearth::registration::register(&gateway.base_url, &request).await?;
        Self::connect(&discovery.broker_url, hub_id, Some(keys.public_key), device_ids, 50).await
    }

    /// Direct broker connect without the HTTP handshake (a "ghost" hub the
    /// gateway has never heard of).
    pub async fn connect(
        broker_url: &str,
        hub_id: &str,
        public_key: Option<String>,
        device_ids: &[&str],
        nonce_capacity: usize,
    ) -> anyhow::Result<Self> {
        let inventory: Vec<DeviceSpec> = device_ids
            .iter()
            .map(|id| DeviceSpec {
                device_id: (*id).to_owned(),
                device_type: "loopback".to_owned(),
                name: format!("{id} device"),
                model: "loopback-1".to_owned(),
                address: "127.0.0.1".to_owned(),
                capabilities: vec!["power".to_owned()],
                parameters: serde_json::Value::Null,
            })
            .collect();

        let mut registry = DriverRegistry::from_inventory(&inventory);
        let mut drivers = HashMap::new();
        for id in device_ids {
            let driver = Arc::new(LoopbackDriver::default());
            registry.insert(*id, Arc::clone(&driver) as Arc<dyn DeviceDriver>);
            drivers.insert((*id).to_owned(), driver);
        }

        let cache = NonceCache::new(nonce_capacity, Duration::from_secs(3600));
        let state = Arc::new(HubState::new(hub_id, inventory, registry, cache));

        let shutdown = CancellationToken::new();
        let opts = WorkerOptions {
            broker_url: broker_url.to_owned(),
            hub_id: hub_id.to_owned(),
            public_key,
            heartbeat: Duration::from_millis(300),
            liveness: Duration::from_secs(5),
            reconnect_initial: Duration::from_millis(200),
            reconnect_max: Duration::from_secs(1),
        };
        let handle = tokio::spawn(worker::run(Arc::clone(&state), opts, shutdown.clone()));

        Ok(Self { state, drivers, shutdown, handle })
    }

    pub fn driver(&self, device_id: &str) -> Arc<LoopbackDriver> {
        self.drivers.get(device_id).cloned().unwrap_or_default()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

// -- Raw worker ---------------------------------------------------------------

/// A hand-driven worker session: registers and then does exactly what the
/// test tells it to. Used to exercise expiry and mid-command loss.
pub struct RawWorker {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub hub_id: String,
}

impl RawWorker {
    pub async fn connect(broker_url: &str, hub_id: &str) -> anyhow::Result<Self> {
        let (mut ws, _) = tokio_tungstenite::connect_async(broker_url).await?;
        let ready = Frame::Ready {
            service: HUB_CONTROL_SERVICE.to_owned(),
            identity: hub_id.to_owned(),
            public_key: None,
        };
        ws.send(Message::Text(ready.encode()?.into())).await?;
        Ok(Self { ws, hub_id: hub_id.to_owned() })
    }

    /// Next dispatched request, skipping keepalives.
    pub async fn next_dispatch(&mut self, timeout: Duration) -> anyhow::Result<ServiceRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or_else(|| anyhow::anyhow!("no dispatch before timeout"))?;
            let msg = tokio::time::timeout(remaining, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("socket closed"))??;
            let Message::Text(text) = msg else { continue };
            match Frame::decode(text.as_str()) {
                Ok(Frame::Dispatch { request, .. }) => return Ok(request),
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    pub async fn reply(&mut self, response: ServiceResponse) -> anyhow::Result<()> {
        let frame = Frame::Reply { response };
        self.ws.send(Message::Text(frame.encode()?.into())).await?;
        Ok(())
    }

    /// Answer the next `list` dispatch with the given devices array.
    pub async fn serve_list(
        &mut self,
        devices: serde_json::Value,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        loop {
            let request = self.next_dispatch(timeout).await?;
            if request.action != "list" {
                continue;
            }
            let hub_id = self.hub_id.clone();
            let response = ServiceResponse::ok(
                &request,
                serde_json::json!({"hub_id": hub_id, "count": devices.as_array().map(|a| a.len()).unwrap_or(0), "devices": devices}),
            );
            return self.reply(response).await;
        }
    }

    pub async fn heartbeat(&mut self) -> anyhow::Result<()> {
        self.ws.send(Message::Text(Frame::Heartbeat.encode()?.into())).await?;
        Ok(())
    }

    /// Wait for the next dispatch while heartbeating, so the broker keeps
    /// this worker live however long the test's setup takes. Consumes and
    /// returns `self` so it can run on a spawned task.
    pub async fn next_dispatch_keepalive(
        mut self,
        timeout: Duration,
    ) -> anyhow::Result<(Self, ServiceRequest)> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("no dispatch before timeout");
            }
            match tokio::time::timeout(Duration::from_millis(250), self.ws.next()).await {
                // Idle slice: keep the broker's last-ping fresh.
                Err(_) => self.heartbeat().await?,
                Ok(None) => anyhow::bail!("socket closed"),
                Ok(Some(Err(e))) => anyhow::bail!("socket error: {e}"),
                Ok(Some(Ok(Message::Text(text)))) => {
                    if let Ok(Frame::Dispatch { request, .. }) = Frame::decode(text.as_str()) {
                        return Ok((self, request));
                    }
                }
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    /// Drop the socket without a disconnect frame.
    pub async fn abandon(mut self) {
        let _ = self.ws.close(None).await;
    }
}
