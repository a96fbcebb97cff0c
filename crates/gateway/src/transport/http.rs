// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: thin translation from requests to hub-service calls.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::service::{self, CommandOutcome, RegisterHubRequest};
use crate::state::GatewayState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    pub user_id: String,
    pub product_key: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub hub_id: String,
    pub user_id: String,
    pub name: String,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok".to_owned() })
}

/// `POST /hub/register` — cold-hub bootstrap.
pub async fn register_hub(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<RegisterHubRequest>,
) -> impl IntoResponse {
    match service::register_hub(&state, req).await {
        Ok(resp) => (StatusCode::CREATED, Json(resp)).into_response(),
        Err(e) => e.to_http_response("registration rejected").into_response(),
    }
}

/// `POST /hub/claim` — a user claims a hub by product key.
pub async fn claim_hub(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<ClaimBody>,
) -> impl IntoResponse {
    match service::claim_hub(&state, &body.user_id, &body.product_key).await {
        Ok(hub) => Json(ClaimResponse {
            hub_id: hub.hub_id,
            user_id: body.user_id,
            name: hub.name,
        })
        .into_response(),
        Err(e) => e.to_http_response("claim rejected").into_response(),
    }
}

/// `POST /users/{user_id}/devices/{device_id}/action` — send a command.
///
/// The body (`{type, action, parameters}`) is the driver action blob,
/// passed through opaquely. `"wait": true` switches from fire-and-forget
/// to an awaited exchange; `"nonce"` carries a client-chosen dedup nonce.
pub async fn device_action(
    State(state): State<Arc<GatewayState>>,
    Path((user_id, device_id)): Path<(String, String)>,
    Json(mut body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let Some(object) = body.as_object_mut() else {
        return GatewayError::BadRequest
            .to_http_response("action body must be an object")
            .into_response();
    };
    let wait = object
        .remove("wait")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let nonce = object
        .remove("nonce")
        .and_then(|v| v.as_str().map(str::to_owned))
        .filter(|n| !n.is_empty());
    if !object.get("action").is_some_and(|v| v.is_string()) {
        return GatewayError::BadRequest
            .to_http_response("missing action")
            .into_response();
    }

    match service::send_device_command(&state, &user_id, &device_id, body, nonce, wait).await {
        Ok(CommandOutcome::Accepted(receipt)) => Json(receipt).into_response(),
        Ok(CommandOutcome::Completed(response)) => Json(serde_json::json!({
            "success": response.success,
            "message_id": response.message_id,
            "nonce": response.nonce,
            "data": response.data,
        }))
        .into_response(),
        Err(e) => e.to_http_response("command failed").into_response(),
    }
}

/// `GET /gateway/status` — broker stats, workers, and the advisory
/// service registry.
pub async fn gateway_status(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let stats = state.broker.stats().await;
    let workers = state.broker.workers().await;
    let services = state.registry.snapshot().await;
    let hubs = state.repo.list_hubs().await.unwrap_or_default();

    Json(serde_json::json!({
        "status": "running",
        "worker_count": stats.workers,
        "broker": stats,
        "workers": workers,
        "services": services,
        "hub_count": hubs.len(),
    }))
    .into_response()
}
