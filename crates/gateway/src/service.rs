// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub orchestration: the registration/claim handshake, the monitor loop
//! reacting to broker worker events, device-inventory reconciliation, and
//! the command path used by the HTTP layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hearth_proto::{keys, nonce, ServiceAction, ServiceRequest, ServiceResponse, HUB_CONTROL_SERVICE};

use crate::broker::BrokerEvent;
use crate::error::GatewayError;
use crate::repository::{DeviceRecord, DeviceStatus, HubRecord, HubStatus, NewHub, RepoError};
use crate::state::GatewayState;

// -- Handshake ----------------------------------------------------------------

/// Body of `POST /hub/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterHubRequest {
    pub hub_id: String,
    pub public_key: String,
    #[serde(default)]
    pub name: String,
    pub product_key: String,
}

/// Reply to a registering hub: what it needs to reach the broker.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterHubResponse {
    pub server_public_key: String,
    pub broker_url: String,
}

/// Cold-hub bootstrap. Idempotent; an existing owner survives.
pub async fn register_hub(
    state: &GatewayState,
    req: RegisterHubRequest,
) -> Result<RegisterHubResponse, GatewayError> {
    if req.hub_id.is_empty() || req.product_key.is_empty() {
        return Err(GatewayError::BadRequest);
    }
    if !keys::is_valid_public_key(&req.public_key) {
        return Err(GatewayError::BadRequest);
    }

    let hub = state
        .repo
        .register_hub(NewHub {
            hub_id: req.hub_id,
            public_key: req.public_key,
            name: req.name,
            product_key: req.product_key,
        })
        .await
        .map_err(repo_error)?;

    info!(hub_id = %hub.hub_id, auto_registered = hub.auto_registered, "hub registered");
    Ok(RegisterHubResponse {
        server_public_key: state.keys.public_key.clone(),
        broker_url: state.config.broker_url(),
    })
}

/// A user claims a hub by product key. Re-claim of a claimed hub conflicts.
pub async fn claim_hub(
    state: &GatewayState,
    user_id: &str,
    product_key: &str,
) -> Result<HubRecord, GatewayError> {
    if user_id.is_empty() || product_key.is_empty() {
        return Err(GatewayError::BadRequest);
    }
    let hub = state.repo.claim_hub(user_id, product_key).await.map_err(repo_error)?;
    info!(hub_id = %hub.hub_id, user_id, "hub claimed");
    Ok(hub)
}

// -- Command path -------------------------------------------------------------

/// Immediate acknowledgement of a fire-and-forget command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandReceipt {
    pub success: bool,
    pub nonce: String,
    pub message_id: String,
}

/// What the HTTP layer gets back from a command.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Dispatched fire-and-forget; completion arrives asynchronously.
    Accepted(CommandReceipt),
    /// Awaited variant: the worker's response.
    Completed(ServiceResponse),
}

/// Send a device command on behalf of a user.
///
/// Default is fire-and-forget: the receipt returns before any worker has
/// acknowledged, and the eventual completion is only logged (correlated by
/// nonce). `wait` switches to an awaited exchange. The nonce is
/// client-chosen when supplied (retries dedup at the device), generated
/// otherwise.
pub async fn send_device_command(
    state: &GatewayState,
    user_id: &str,
    device_id: &str,
    action: serde_json::Value,
    client_nonce: Option<String>,
    wait: bool,
) -> Result<CommandOutcome, GatewayError> {
    let entries = state.repo.device_with_hub(device_id).await.map_err(repo_error)?;
    if entries.is_empty() {
        return Err(GatewayError::NotFound);
    }
    let Some((hub, _device)) = entries
        .into_iter()
        .find(|(hub, _)| hub.user_id.as_deref() == Some(user_id))
    else {
        return Err(GatewayError::Forbidden);
    };

    // Routing is by hub id; fail fast when that hub has no live worker.
    let live = state
        .broker
        .workers()
        .await
        .into_iter()
        .any(|w| w.identity == hub.hub_id && w.service == HUB_CONTROL_SERVICE && w.live);
    if !live {
        return Err(GatewayError::NoWorker);
    }

    let command_nonce = client_nonce.unwrap_or_else(nonce::generate);
    let request = ServiceRequest::new(
        uuid::Uuid::new_v4().to_string(),
        HUB_CONTROL_SERVICE,
        ServiceAction::Execute,
    )
    .with_payload(serde_json::json!({"device_id": device_id, "action": action}))
    .with_nonce(command_nonce.clone());
    let message_id = request.message_id.clone();

    if wait {
        let response = state.broker.request(request, Some(hub.hub_id), None).await;
        if response.success {
            return Ok(CommandOutcome::Completed(response));
        }
        let error = response.error.unwrap_or_default();
        return Err(GatewayError::from_wire(&error));
    }

    state.broker.request_nf(request, Some(hub.hub_id.clone())).await;
    debug!(hub_id = %hub.hub_id, device_id, nonce = %command_nonce, "command dispatched");
    Ok(CommandOutcome::Accepted(CommandReceipt {
        success: true,
        nonce: command_nonce,
        message_id,
    }))
}

// -- Monitor loop -------------------------------------------------------------

/// Spawn the monitor: broker events, the 30 s status sweep, and registry
/// cleanup.
pub fn spawn_monitor(state: Arc<GatewayState>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut events = state.broker.subscribe();
        let mut sweep = tokio::time::interval(state.config.monitor_interval());
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut cleanup = tokio::time::interval(state.config.registry_stale());
        cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Ok(event) => handle_event(&state, event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "monitor lagged behind broker events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = sweep.tick() => reconcile(&state).await,
                _ = cleanup.tick() => state.registry.cleanup().await,
            }
        }
        debug!("monitor loop stopped");
    });
}

async fn handle_event(state: &GatewayState, event: BrokerEvent) {
    match event {
        BrokerEvent::WorkerAdded { identity, service } if service == HUB_CONTROL_SERVICE => {
            on_hub_joined(state, &identity).await;
        }
        BrokerEvent::WorkerDisconnected { identity, service }
        | BrokerEvent::WorkerExpired { identity, service }
            if service == HUB_CONTROL_SERVICE =>
        {
            on_hub_left(state, &identity).await;
        }
        BrokerEvent::OrphanReply { identity, message_id, nonce, success } => {
            // Fire-and-forget completions land here; nonce is the correlator.
            info!(
                hub_id = %identity,
                message_id,
                nonce = nonce.as_deref().unwrap_or(""),
                success,
                "late command completion"
            );
        }
        _ => {}
    }
}

/// A worker appeared: make sure the hub exists, flip it online, pull its
/// inventory.
pub(crate) async fn on_hub_joined(state: &GatewayState, hub_id: &str) {
    if let Err(e) = state.repo.ensure_hub(hub_id).await {
        warn!(hub_id, err = %e, "hub insert failed");
        return;
    }
    if let Err(e) = state.repo.set_hub_status(hub_id, HubStatus::Online).await {
        warn!(hub_id, err = %e, "hub status update failed");
    }
    pull_inventory(state, hub_id).await;
}

/// A worker went away: hub offline, devices offline, registry pruned.
pub(crate) async fn on_hub_left(state: &GatewayState, hub_id: &str) {
    match state.repo.set_hub_status(hub_id, HubStatus::Offline).await {
        Ok(()) | Err(RepoError::NotFound) => {}
        Err(e) => warn!(hub_id, err = %e, "hub status update failed"),
    }
    if let Err(e) = state.repo.set_devices_status(hub_id, DeviceStatus::Offline).await {
        warn!(hub_id, err = %e, "device status cascade failed");
    }
    state.registry.remove_provider(hub_id).await;
    info!(hub_id, "hub offline");
}

/// Shape of one device in a `list` reply.
#[derive(Debug, Deserialize)]
struct WireDevice {
    device_id: String,
    device_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Issue `list` to a freshly joined worker and reconcile the directory.
/// Tolerates errors and partial arrays; ill-formed devices are skipped.
pub(crate) async fn pull_inventory(state: &GatewayState, hub_id: &str) {
    let request = ServiceRequest::new(
        uuid::Uuid::new_v4().to_string(),
        HUB_CONTROL_SERVICE,
        ServiceAction::List,
    );
    let response = state
        .broker
        .request(request, Some(hub_id.to_owned()), Some(state.config.request_timeout()))
        .await;
    if !response.success {
        warn!(
            hub_id,
            error = response.error.as_deref().unwrap_or(""),
            "inventory pull failed"
        );
        return;
    }

    let devices = response
        .data
        .as_ref()
        .and_then(|d| d.get("devices"))
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default();

    let mut registry_entries: Vec<(String, Vec<String>)> = Vec::new();
    let mut upserted = 0usize;
    for value in devices {
        let Some(device) = parse_wire_device(&value) else {
            warn!(hub_id, %value, "skipping ill-formed inventory device");
            continue;
        };
        registry_entries.push((device.device_type.clone(), device.capabilities.clone()));
        match state.repo.upsert_device(hub_id, device).await {
            Ok(()) => upserted += 1,
            Err(e) => warn!(hub_id, err = %e, "device upsert failed"),
        }
    }
    state.registry.record_inventory(hub_id, &registry_entries).await;
    info!(hub_id, devices = upserted, "inventory reconciled");
}

/// Parse one inventory element; `None` for ill-formed entries.
fn parse_wire_device(value: &serde_json::Value) -> Option<DeviceRecord> {
    let wire: WireDevice = serde_json::from_value(value.clone()).ok()?;
    if wire.device_id.is_empty() || wire.device_type.is_empty() {
        return None;
    }
    // Online unless the reply says otherwise.
    let status = match wire.status.as_deref() {
        Some("offline") => DeviceStatus::Offline,
        Some("unknown") => DeviceStatus::Unknown,
        _ => DeviceStatus::Online,
    };
    Some(DeviceRecord {
        device_id: wire.device_id,
        device_type: wire.device_type,
        name: wire.name,
        model: wire.model,
        address: wire.address,
        capabilities: wire.capabilities,
        status,
    })
}

/// Periodic sweep: hubs with a live worker flip online; the rest are left
/// untouched (loss is handled by disconnect/expiry events).
pub(crate) async fn reconcile(state: &GatewayState) {
    for worker in state.broker.workers().await {
        if worker.service != HUB_CONTROL_SERVICE || !worker.live {
            continue;
        }
        match state.repo.set_hub_status(&worker.identity, HubStatus::Online).await {
            Ok(()) | Err(RepoError::NotFound) => {}
            Err(e) => warn!(hub_id = %worker.identity, err = %e, "status sweep failed"),
        }
        state.registry.touch_provider(&worker.identity).await;
    }
}

fn repo_error(err: RepoError) -> GatewayError {
    match err {
        RepoError::NotFound => GatewayError::NotFound,
        RepoError::Conflict => GatewayError::Conflict,
        RepoError::Internal(msg) => {
            warn!(err = %msg, "repository failure");
            GatewayError::Internal
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
