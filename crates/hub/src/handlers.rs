// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request handling for the `hub.control` service: action dispatch, the
//! nonce dedup pipeline, and per-device serialized driver invocation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use hearth_proto::{nonce, ServiceAction, ServiceErrorCode, ServiceRequest, ServiceResponse};

use crate::devices::DeviceSpec;
use crate::driver::DriverRegistry;
use crate::metrics::HubMetrics;
use crate::nonce_cache::{CachedOutcome, NonceCache};
use crate::worker::SessionState;

/// Shared hub runtime state: inventory, drivers, cache, counters.
pub struct HubState {
    pub hub_id: String,
    pub inventory: Vec<DeviceSpec>,
    pub drivers: DriverRegistry,
    pub cache: Arc<NonceCache>,
    pub metrics: HubMetrics,
    pub session_state: RwLock<SessionState>,
    /// One in-flight command per device: driver re-entrancy is not allowed.
    device_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug, Deserialize)]
struct ExecutePayload {
    device_id: String,
    action: serde_json::Value,
}

impl HubState {
    pub fn new(
        hub_id: impl Into<String>,
        inventory: Vec<DeviceSpec>,
        drivers: DriverRegistry,
        cache: NonceCache,
    ) -> Self {
        Self {
            hub_id: hub_id.into(),
            inventory,
            drivers,
            cache: Arc::new(cache),
            metrics: HubMetrics::new(),
            session_state: RwLock::new(SessionState::Connecting),
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one dispatched request, recording counters and latency.
    pub async fn handle(&self, request: ServiceRequest) -> ServiceResponse {
        let started = Instant::now();
        let response = self.dispatch(&request).await;
        self.metrics.record(response.success, started.elapsed()).await;
        response
    }

    async fn dispatch(&self, request: &ServiceRequest) -> ServiceResponse {
        match ServiceAction::parse(&request.action) {
            Some(ServiceAction::Execute) => self.execute(request).await,
            Some(ServiceAction::List) => self.list(request),
            Some(ServiceAction::Status) => self.status(request).await,
            Some(ServiceAction::Info) => self.info(request),
            None => ServiceResponse::error(request, ServiceErrorCode::UnknownAction.as_str()),
        }
    }

    /// `execute`: resolve the driver, run the nonce pipeline, invoke.
    async fn execute(&self, request: &ServiceRequest) -> ServiceResponse {
        let payload: ExecutePayload = match serde_json::from_value(request.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                return ServiceResponse::error(
                    request,
                    ServiceErrorCode::BadRequest.with_detail(e),
                )
            }
        };

        let Some(driver) = self.drivers.get(&payload.device_id) else {
            return ServiceResponse::error(request, ServiceErrorCode::DeviceNotFound.as_str());
        };

        // Empty or absent nonce disables caching entirely.
        let nonce = request.nonce.as_deref().filter(|n| !n.is_empty());
        if let Some(nonce) = nonce {
            if !nonce::is_valid(nonce) {
                return ServiceResponse::error(request, ServiceErrorCode::InvalidNonce.as_str());
            }
            if let Some(outcome) = self.cache.check(&payload.device_id, nonce).await {
                return outcome_response(request, outcome);
            }
        }

        let lock = self.device_lock(&payload.device_id).await;
        let _guard = lock.lock().await;

        // A concurrent command with the same nonce may have completed while
        // this one waited for the device.
        if let Some(nonce) = nonce {
            if let Some(outcome) = self.cache.check(&payload.device_id, nonce).await {
                return outcome_response(request, outcome);
            }
        }

        let action = payload.action.clone();
        let joined = tokio::task::spawn_blocking(move || driver.process(&action)).await;
        let (outcome, cacheable) = match joined {
            Ok(Ok(data)) => {
                (CachedOutcome { success: true, data: Some(data), error: None }, true)
            }
            Ok(Err(e)) => (
                CachedOutcome {
                    success: false,
                    data: None,
                    error: Some(ServiceErrorCode::DriverError.with_detail(e)),
                },
                true,
            ),
            Err(join_err) => {
                if join_err.is_panic() {
                    warn!(device_id = %payload.device_id, "driver panicked");
                }
                // Not a canonical outcome; the nonce stays replayable.
                (
                    CachedOutcome {
                        success: false,
                        data: None,
                        error: Some(ServiceErrorCode::Internal.as_str().to_owned()),
                    },
                    false,
                )
            }
        };

        if cacheable {
            if let Some(nonce) = nonce {
                self.cache.store(&payload.device_id, nonce, outcome.clone()).await;
            }
        }
        outcome_response(request, outcome)
    }

    /// `list`: the declared inventory, no driver network calls.
    fn list(&self, request: &ServiceRequest) -> ServiceResponse {
        let devices: Vec<_> = self.inventory.iter().map(DeviceSpec::to_wire).collect();
        ServiceResponse::ok(
            request,
            json!({
                "hub_id": self.hub_id,
                "count": devices.len(),
                "devices": devices,
            }),
        )
    }

    /// `status`: hub-scoped counters.
    async fn status(&self, request: &ServiceRequest) -> ServiceResponse {
        let metrics = self.metrics.snapshot().await;
        let state = *self.session_state.read().await;
        ServiceResponse::ok(
            request,
            json!({
                "hub_id": self.hub_id,
                "state": state.as_str(),
                "device_count": self.inventory.len(),
                "processed": metrics.processed,
                "failed": metrics.failed,
                "error_rate": metrics.error_rate,
                "avg_latency_ms": metrics.avg_latency_ms,
                "last_latency_ms": metrics.last_latency_ms,
            }),
        )
    }

    /// `info`: capability union and known device types.
    fn info(&self, request: &ServiceRequest) -> ServiceResponse {
        let capabilities: BTreeSet<&str> = self
            .inventory
            .iter()
            .flat_map(|d| d.capabilities.iter().map(String::as_str))
            .collect();
        let device_types: BTreeSet<&str> =
            self.inventory.iter().map(|d| d.device_type.as_str()).collect();
        ServiceResponse::ok(
            request,
            json!({
                "hub_id": self.hub_id,
                "capabilities": capabilities,
                "device_types": device_types,
            }),
        )
    }

    async fn device_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.device_locks.lock().await;
        Arc::clone(locks.entry(device_id.to_owned()).or_default())
    }
}

/// Rebuild a response envelope around a (possibly replayed) outcome. The
/// correlators always come from the request in hand.
fn outcome_response(request: &ServiceRequest, outcome: CachedOutcome) -> ServiceResponse {
    ServiceResponse {
        message_id: request.message_id.clone(),
        service: request.service.clone(),
        nonce: request.nonce.clone(),
        success: outcome.success,
        data: outcome.data,
        error: outcome.error,
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
