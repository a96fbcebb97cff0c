// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker: rendezvous between in-process request issuers and the hub
//! workers connected over WebSocket.
//!
//! All broker state lives inside one event-loop task; everything else
//! talks to it through [`BrokerHandle`] channels. Worker socket I/O runs
//! on per-session tasks with one outbound writer each.

pub mod core;
pub mod events;
pub mod session;

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use hearth_proto::{Frame, ServiceErrorCode, ServiceRequest, ServiceResponse};

pub use events::BrokerEvent;

use self::core::{BrokerCore, Command, WorkerRegistration};

/// Broker tuning.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Worker eviction window: silent longer than this and the worker is
    /// expired.
    pub liveness_window: Duration,
    /// Cadence of broker → worker heartbeat frames.
    pub heartbeat_interval: Duration,
    /// Deadline applied to awaited requests that don't carry their own.
    pub default_timeout: Duration,
}

/// Routing and correlation counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BrokerStats {
    pub workers: usize,
    pub live_workers: usize,
    pub services: usize,
    pub pending: usize,
    pub dispatched: u64,
    pub fire_and_forget: u64,
    pub replies: u64,
    pub orphan_replies: u64,
    pub timeouts: u64,
    pub no_worker: u64,
    pub superseded: u64,
    pub worker_gone: u64,
}

/// Read-only worker snapshot for the monitor and the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub identity: String,
    pub service: String,
    pub last_ping_secs_ago: u64,
    pub live: bool,
}

/// Spawn the broker loop; the returned handle is the only way in.
pub fn spawn(settings: BrokerSettings, shutdown: CancellationToken) -> BrokerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(256);
    let core = BrokerCore::new(settings, event_tx.clone());
    tokio::spawn(core.run(cmd_rx, shutdown));
    BrokerHandle { cmd_tx, event_tx }
}

/// Cloneable handle to the broker loop.
#[derive(Clone)]
pub struct BrokerHandle {
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<BrokerEvent>,
}

impl BrokerHandle {
    /// Issue an awaited request. `target` pins the dispatch to one worker
    /// identity; without it the broker round-robins across the service.
    ///
    /// Always resolves: broker-synthesized errors (`no_worker`, `timeout`,
    /// `worker_gone`, `superseded`) come back as failed responses.
    pub async fn request(
        &self,
        request: ServiceRequest,
        target: Option<String>,
        timeout: Option<Duration>,
    ) -> ServiceResponse {
        let (resp_tx, resp_rx) = oneshot::channel();
        let fallback = ServiceResponse::failure(
            &request.message_id,
            &request.service,
            request.nonce.clone(),
            ServiceErrorCode::Internal.as_str(),
        );
        let cmd = Command::Request { request, target, timeout, resp: resp_tx };
        if self.cmd_tx.send(cmd).await.is_err() {
            return fallback;
        }
        resp_rx.await.unwrap_or(fallback)
    }

    /// Issue a fire-and-forget request: dispatched without a pending
    /// entry, any later reply is dropped (and surfaced as
    /// [`BrokerEvent::OrphanReply`]).
    pub async fn request_nf(&self, request: ServiceRequest, target: Option<String>) {
        let _ = self.cmd_tx.send(Command::RequestNf { request, target }).await;
    }

    pub async fn stats(&self) -> BrokerStats {
        let (resp_tx, resp_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stats { resp: resp_tx }).await.is_err() {
            return BrokerStats::default();
        }
        resp_rx.await.unwrap_or_default()
    }

    pub async fn workers(&self) -> Vec<WorkerInfo> {
        let (resp_tx, resp_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Workers { resp: resp_tx }).await.is_err() {
            return Vec::new();
        }
        resp_rx.await.unwrap_or_default()
    }

    /// Subscribe to broker lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) async fn register_worker(&self, registration: WorkerRegistration) {
        let _ = self.cmd_tx.send(Command::Register(registration)).await;
    }

    pub(crate) async fn worker_frame(&self, identity: &str, session: u64, frame: Frame) {
        let cmd = Command::WorkerFrame { identity: identity.to_owned(), session, frame };
        let _ = self.cmd_tx.send(cmd).await;
    }

    pub(crate) async fn session_closed(&self, identity: &str, session: u64) {
        let cmd = Command::SessionClosed { identity: identity.to_owned(), session };
        let _ = self.cmd_tx.send(cmd).await;
    }
}
