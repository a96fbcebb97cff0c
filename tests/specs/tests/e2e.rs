// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: a real gateway on TCP, real hub workers over
//! WebSocket, loopback drivers counting invocations.

use std::time::Duration;

use serde_json::json;

use hearth_specs::{Gateway, Hub, RawWorker};
use hearthgate::repository::{DeviceStatus, HubStatus};

const WAIT: Duration = Duration::from_secs(5);

async fn wait_invocations(
    driver: &hearth::driver::loopback::LoopbackDriver,
    expected: u64,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while driver.invocations() != expected {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("driver at {} invocations, wanted {expected}", driver.invocations());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    Ok(())
}

// -- Scenario: cold start + claim + command -----------------------------------

#[tokio::test]
async fn cold_start_claim_and_command() -> anyhow::Result<()> {
    let gateway = Gateway::start().await?;
    let hub = Hub::start(&gateway, "hub-a", "PK-A", &["dev1", "dev2"]).await?;

    // Worker joined; inventory pulled into the directory.
    gateway.wait_hub_status("hub-a", HubStatus::Online, WAIT).await?;
    gateway.wait_device_count("hub-a", 2, WAIT).await?;

    // The registered hub is unowned until claimed.
    let record = gateway.state.repo.hub("hub-a").await?.ok_or_else(|| anyhow::anyhow!("hub"))?;
    assert!(record.auto_registered);
    assert!(record.user_id.is_none());

    gateway.create_user("7").await?;
    let resp = gateway
        .http()
        .post(format!("{}/hub/claim", gateway.base_url))
        .json(&json!({"user_id": "7", "product_key": "PK-A"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);

    let record = gateway.state.repo.hub("hub-a").await?.ok_or_else(|| anyhow::anyhow!("hub"))?;
    assert_eq!(record.user_id.as_deref(), Some("7"));
    assert!(!record.auto_registered);

    // Fire-and-forget command: immediate receipt, one driver invocation.
    let resp = gateway
        .http()
        .post(format!("{}/users/7/devices/dev1/action", gateway.base_url))
        .json(&json!({"type": "remote", "action": "power_on"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["success"], true);
    let nonce = body["nonce"].as_str().unwrap_or("");
    assert!(hearth_proto::nonce::is_valid(nonce), "bad nonce: {nonce}");
    assert!(body["message_id"].as_str().is_some());

    wait_invocations(&hub.driver("dev1"), 1).await?;
    assert_eq!(hub.driver("dev2").invocations(), 0);

    hub.stop().await;
    Ok(())
}

// -- Scenario: duplicate command ----------------------------------------------

#[tokio::test]
async fn duplicate_nonce_executes_the_driver_once() -> anyhow::Result<()> {
    let gateway = Gateway::start().await?;
    let hub = Hub::start(&gateway, "hub-b", "PK-B", &["tv"]).await?;
    gateway.wait_hub_status("hub-b", HubStatus::Online, WAIT).await?;
    gateway.wait_device_count("hub-b", 1, WAIT).await?;
    gateway.create_user("7").await?;
    gateway
        .http()
        .post(format!("{}/hub/claim", gateway.base_url))
        .json(&json!({"user_id": "7", "product_key": "PK-B"}))
        .send()
        .await?
        .error_for_status()?;

    let nonce = hearth_proto::nonce::generate();
    let url = format!("{}/users/7/devices/tv/action", gateway.base_url);
    let body = json!({"type": "remote", "action": "power_on", "nonce": nonce, "wait": true});

    let first: serde_json::Value =
        gateway.http().post(&url).json(&body).send().await?.error_for_status()?.json().await?;
    let second: serde_json::Value =
        gateway.http().post(&url).json(&body).send().await?.error_for_status()?.json().await?;

    // One execution; the replayed outcome is identical.
    assert_eq!(hub.driver("tv").invocations(), 1);
    assert_eq!(first["success"], second["success"]);
    assert_eq!(first["data"], second["data"]);
    assert_eq!(first["nonce"], second["nonce"]);

    // A fresh nonce executes again.
    let fresh = json!({"type": "remote", "action": "power_on", "wait": true});
    gateway.http().post(&url).json(&fresh).send().await?.error_for_status()?;
    assert_eq!(hub.driver("tv").invocations(), 2);

    hub.stop().await;
    Ok(())
}

// -- Scenario: hub drops mid-command ------------------------------------------

#[tokio::test]
async fn hub_death_mid_command_resolves_worker_gone() -> anyhow::Result<()> {
    let gateway = Gateway::start().await?;

    // A hand-driven worker: registers, serves the inventory pull, then
    // goes silent with a command in flight.
    let mut worker = RawWorker::connect(&gateway.broker_url, "hub-c").await?;
    worker
        .serve_list(
            json!([{"device_id": "tv", "device_type": "loopback", "capabilities": ["power"]}]),
            WAIT,
        )
        .await?;
    // Keep the worker heartbeating on its own task while the test sets
    // up; it falls silent the moment the dispatch lands.
    let worker_task = tokio::spawn(worker.next_dispatch_keepalive(WAIT));

    gateway.wait_hub_status("hub-c", HubStatus::Online, WAIT).await?;
    gateway.wait_device_count("hub-c", 1, WAIT).await?;

    // Claim the auto-inserted hub with its generated product key.
    gateway.create_user("7").await?;
    let record = gateway.state.repo.hub("hub-c").await?.ok_or_else(|| anyhow::anyhow!("hub"))?;
    gateway
        .http()
        .post(format!("{}/hub/claim", gateway.base_url))
        .json(&json!({"user_id": "7", "product_key": record.product_key}))
        .send()
        .await?
        .error_for_status()?;

    // Awaited command; the worker receives it and never answers. The
    // broker expires the worker past the liveness window and the pending
    // resolves worker_gone → 503.
    let url = format!("{}/users/7/devices/tv/action", gateway.base_url);
    let pending = {
        let client = gateway.http();
        let url = url.clone();
        tokio::spawn(async move {
            client
                .post(&url)
                .json(&json!({"type": "remote", "action": "power_on", "wait": true}))
                .send()
                .await
        })
    };

    let (worker, dispatched) = tokio::time::timeout(WAIT, worker_task).await???;
    assert_eq!(dispatched.action, "execute");
    // Silence. No reply, no heartbeat.

    let resp = tokio::time::timeout(WAIT, pending).await???;
    assert_eq!(resp.status(), 503);

    gateway.wait_hub_status("hub-c", HubStatus::Offline, WAIT).await?;
    let devices = gateway.state.repo.devices_for_hub("hub-c").await?;
    assert!(devices.iter().all(|d| d.status == DeviceStatus::Offline));

    worker.abandon().await;
    Ok(())
}

// -- Scenario: unknown hub worker ---------------------------------------------

#[tokio::test]
async fn ghost_worker_is_inserted_and_inventoried() -> anyhow::Result<()> {
    let gateway = Gateway::start().await?;

    // Never registered over HTTP; connects straight to the broker.
    let hub = Hub::connect(&gateway.broker_url, "ghost", None, &["dev1"], 50).await?;

    gateway.wait_hub_status("ghost", HubStatus::Online, WAIT).await?;
    gateway.wait_device_count("ghost", 1, WAIT).await?;

    let record = gateway.state.repo.hub("ghost").await?.ok_or_else(|| anyhow::anyhow!("hub"))?;
    assert!(record.auto_registered);
    assert!(record.user_id.is_none());
    assert!(!record.product_key.is_empty());

    let devices = gateway.state.repo.devices_for_hub("ghost").await?;
    assert_eq!(devices[0].device_id, "dev1");
    assert_eq!(devices[0].status, DeviceStatus::Online);

    hub.stop().await;
    Ok(())
}

// -- Scenario: nonce churn past capacity --------------------------------------

#[tokio::test]
async fn nonce_churn_keeps_the_cache_bounded() -> anyhow::Result<()> {
    let gateway = Gateway::start().await?;
    let hub = Hub::connect(&gateway.broker_url, "hub-e", None, &["tv"], 50).await?;
    gateway.wait_hub_status("hub-e", HubStatus::Online, WAIT).await?;
    gateway.wait_device_count("hub-e", 1, WAIT).await?;

    gateway.create_user("7").await?;
    let record = gateway.state.repo.hub("hub-e").await?.ok_or_else(|| anyhow::anyhow!("hub"))?;
    gateway
        .http()
        .post(format!("{}/hub/claim", gateway.base_url))
        .json(&json!({"user_id": "7", "product_key": record.product_key}))
        .send()
        .await?
        .error_for_status()?;

    let url = format!("{}/users/7/devices/tv/action", gateway.base_url);
    let client = gateway.http();

    // 60 distinct nonces against a 50-entry cache.
    let nonces: Vec<String> = (0..60)
        .map(|i| format!("{}-{:08x}", 1712345678901u64 + i, i))
        .collect();
    for nonce in &nonces {
        client
            .post(&url)
            .json(&json!({"type": "remote", "action": "power_on", "nonce": nonce, "wait": true}))
            .send()
            .await?
            .error_for_status()?;
    }
    assert_eq!(hub.driver("tv").invocations(), 60);
    assert_eq!(hub.state.cache.device_count("tv").await, 50);

    // Replaying newest-first: the 50 most recent hit the cache, the 10
    // oldest re-execute. No crash, capacity stays bounded.
    for nonce in nonces.iter().rev() {
        client
            .post(&url)
            .json(&json!({"type": "remote", "action": "power_on", "nonce": nonce, "wait": true}))
            .send()
            .await?
            .error_for_status()?;
    }
    assert_eq!(hub.driver("tv").invocations(), 70);
    assert_eq!(hub.state.cache.device_count("tv").await, 50);

    hub.stop().await;
    Ok(())
}

// -- Reconnection -------------------------------------------------------------

#[tokio::test]
async fn worker_reconnects_after_socket_loss() -> anyhow::Result<()> {
    let gateway = Gateway::start().await?;
    let hub = Hub::connect(&gateway.broker_url, "hub-f", None, &["tv"], 50).await?;
    gateway.wait_hub_status("hub-f", HubStatus::Online, WAIT).await?;

    // A second session under the same identity bumps the first; the real
    // worker's session drops and it reconnects with backoff.
    let imposter = RawWorker::connect(&gateway.broker_url, "hub-f").await?;
    imposter.abandon().await;

    // The hub is briefly offline, then the original worker re-registers.
    gateway.wait_hub_status("hub-f", HubStatus::Online, Duration::from_secs(10)).await?;

    hub.stop().await;
    Ok(())
}
