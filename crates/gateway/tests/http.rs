// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed. Worker-dependent
//! flows (commands reaching a hub) are covered by the end-to-end specs.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hearthgate::config::GatewayConfig;
use hearthgate::repository::{DeviceRecord, DeviceStatus, NewHub, Repository};
use hearthgate::state::GatewayState;
use hearthgate::transport::build_router;

struct TestGateway {
    server: TestServer,
    state: Arc<GatewayState>,
    _dir: tempfile::TempDir,
}

fn gateway_with_args(extra: &[&str]) -> TestGateway {
    let dir = tempfile::tempdir().expect("tempdir");
    let key_file = dir.path().join("keys.json");
    let mut args = vec!["hearthgate".to_owned(), "--key-file".to_owned()];
    args.push(key_file.to_string_lossy().into_owned());
    args.extend(extra.iter().map(|s| (*s).to_owned()));
    let config = GatewayConfig::parse_from(args);

    let repo: Arc<dyn Repository> = Arc::new(hearthgate::repository::MemoryRepository::new());
    let state = hearthgate::build_state(config, repo, CancellationToken::new())
        .expect("state built");
    let server = TestServer::new(build_router(Arc::clone(&state))).expect("test server");
    TestGateway { server, state, _dir: dir }
}

fn gateway() -> TestGateway {
    gateway_with_args(&[])
}

fn register_body(hub_id: &str, product_key: &str) -> serde_json::Value {
    json!({
        "hub_id": hub_id,
        "public_key": "k".repeat(40),
        "name": format!("{hub_id} name"),
        "product_key": product_key,
    })
}

async fn seed_claimed_device(gw: &TestGateway, hub_id: &str, user_id: &str, device_id: &str) {
    gw.state.repo.create_user(user_id, "user").await.expect("user");
    gw.state
        .repo
        .register_hub(NewHub {
            hub_id: hub_id.to_owned(),
            public_key: "k".repeat(40),
            name: String::new(),
            product_key: format!("PK-{hub_id}"),
        })
        .await
        .expect("hub");
    gw.state.repo.claim_hub(user_id, &format!("PK-{hub_id}")).await.expect("claim");
    gw.state
        .repo
        .upsert_device(
            hub_id,
            DeviceRecord {
                device_id: device_id.to_owned(),
                device_type: "loopback".to_owned(),
                name: String::new(),
                model: String::new(),
                address: String::new(),
                capabilities: vec![],
                status: DeviceStatus::Online,
            },
        )
        .await
        .expect("device");
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn health_is_ok() {
    let gw = gateway();
    let resp = gw.server.get("/health").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
}

// -- Hub registration ---------------------------------------------------------

#[tokio::test]
async fn register_returns_gateway_facts() {
    let gw = gateway();
    let resp = gw.server.post("/hub/register").json(&register_body("hub-1", "PK-1")).await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["server_public_key"], gw.state.keys.public_key.as_str());
    assert!(body["broker_url"].as_str().unwrap_or("").ends_with("/ws/worker"));
}

#[tokio::test]
async fn duplicate_register_is_idempotent() {
    let gw = gateway();
    gw.server
        .post("/hub/register")
        .json(&register_body("hub-1", "PK-1"))
        .await
        .assert_status(StatusCode::CREATED);
    gw.server
        .post("/hub/register")
        .json(&register_body("hub-1", "PK-1"))
        .await
        .assert_status(StatusCode::CREATED);

    let hubs = gw.state.repo.list_hubs().await.expect("hubs");
    assert_eq!(hubs.len(), 1);
}

#[tokio::test]
async fn register_with_malformed_key_is_400() {
    let gw = gateway();
    let resp = gw
        .server
        .post("/hub/register")
        .json(&json!({
            "hub_id": "hub-1",
            "public_key": "not-z85",
            "product_key": "PK-1",
        }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

// -- Claim --------------------------------------------------------------------

#[tokio::test]
async fn claim_then_reclaim_conflicts() {
    let gw = gateway();
    gw.state.repo.create_user("7", "seven").await.expect("user");
    gw.state.repo.create_user("8", "eight").await.expect("user");
    gw.server
        .post("/hub/register")
        .json(&register_body("hub-1", "PK-1"))
        .await
        .assert_status(StatusCode::CREATED);

    let resp = gw
        .server
        .post("/hub/claim")
        .json(&json!({"user_id": "7", "product_key": "PK-1"}))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["hub_id"], "hub-1");
    assert_eq!(body["user_id"], "7");

    gw.server
        .post("/hub/claim")
        .json(&json!({"user_id": "8", "product_key": "PK-1"}))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn claim_with_unknown_product_key_is_404() {
    let gw = gateway();
    gw.state.repo.create_user("7", "seven").await.expect("user");
    gw.server
        .post("/hub/claim")
        .json(&json!({"user_id": "7", "product_key": "PK-missing"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// -- Device commands ----------------------------------------------------------

#[tokio::test]
async fn action_on_unknown_device_is_404() {
    let gw = gateway();
    let resp = gw
        .server
        .post("/users/7/devices/ghost/action")
        .json(&json!({"type": "remote", "action": "power_on"}))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn action_across_users_is_403() {
    let gw = gateway();
    seed_claimed_device(&gw, "hub-1", "7", "tv").await;
    let resp = gw
        .server
        .post("/users/8/devices/tv/action")
        .json(&json!({"type": "remote", "action": "power_on"}))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn action_without_live_worker_is_503() {
    let gw = gateway();
    seed_claimed_device(&gw, "hub-1", "7", "tv").await;
    let resp = gw
        .server
        .post("/users/7/devices/tv/action")
        .json(&json!({"type": "remote", "action": "power_on"}))
        .await;
    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn action_with_bad_body_is_400() {
    let gw = gateway();
    seed_claimed_device(&gw, "hub-1", "7", "tv").await;
    let resp = gw
        .server
        .post("/users/7/devices/tv/action")
        .json(&json!({"type": "remote"}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

// -- Status -------------------------------------------------------------------

#[tokio::test]
async fn gateway_status_reports_broker_and_registry() {
    let gw = gateway();
    let resp = gw.server.get("/gateway/status").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["worker_count"], 0);
    assert!(body["broker"]["dispatched"].is_number());
    assert!(body["services"].is_array());
}

// -- Auth ---------------------------------------------------------------------

#[tokio::test]
async fn auth_token_guards_the_api() {
    let gw = gateway_with_args(&["--auth-token", "secret"]);

    // Health and registration are exempt.
    gw.server.get("/health").await.assert_status(StatusCode::OK);
    gw.server
        .post("/hub/register")
        .json(&register_body("hub-1", "PK-1"))
        .await
        .assert_status(StatusCode::CREATED);

    // Everything else requires the bearer token.
    gw.server
        .post("/hub/claim")
        .json(&json!({"user_id": "7", "product_key": "PK-1"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    gw.server.get("/gateway/status").await.assert_status(StatusCode::UNAUTHORIZED);

    let resp = gw
        .server
        .get("/gateway/status")
        .add_header("authorization", "Bearer secret")
        .await;
    resp.assert_status(StatusCode::OK);
}
