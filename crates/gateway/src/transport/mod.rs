// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the gateway.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::broker::session::ws_worker_handler;
use crate::state::GatewayState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let mut router = Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Hub handshake
        .route("/hub/register", post(http::register_hub))
        .route("/hub/claim", post(http::claim_hub))
        // Device commands
        .route(
            "/users/{user_id}/devices/{device_id}/action",
            post(http::device_action),
        )
        // Introspection
        .route("/gateway/status", get(http::gateway_status))
        // Worker WebSocket
        .route("/ws/worker", get(ws_worker_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive());

    if let Some(limit) = state.config.max_concurrent_requests {
        router = router.layer(tower::limit::GlobalConcurrencyLimitLayer::new(limit));
    }

    router.with_state(state)
}
