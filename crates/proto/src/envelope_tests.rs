// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn request() -> ServiceRequest {
    ServiceRequest::new("m-1", "hub.control", ServiceAction::Execute)
        .with_payload(json!({"device_id": "tv", "action": {"cmd": "power_on"}}))
        .with_nonce("1712345678901-a1b2c3d4")
}

#[test]
fn request_round_trips() -> anyhow::Result<()> {
    let req = request();
    let encoded = serde_json::to_string(&req)?;
    let decoded: ServiceRequest = serde_json::from_str(&encoded)?;
    assert_eq!(decoded, req);
    Ok(())
}

#[test]
fn response_round_trips() -> anyhow::Result<()> {
    let resp = ServiceResponse::ok(&request(), json!({"done": true}));
    let encoded = serde_json::to_string(&resp)?;
    let decoded: ServiceResponse = serde_json::from_str(&encoded)?;
    assert_eq!(decoded, resp);
    Ok(())
}

#[test]
fn response_echoes_correlators() {
    let req = request();
    let resp = ServiceResponse::error(&req, "device_not_found");
    assert_eq!(resp.message_id, req.message_id);
    assert_eq!(resp.nonce, req.nonce);
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("device_not_found"));
}

#[test]
fn absent_nonce_is_omitted_on_the_wire() -> anyhow::Result<()> {
    let req = ServiceRequest::new("m-2", "hub.control", ServiceAction::List);
    let encoded = serde_json::to_string(&req)?;
    assert!(!encoded.contains("nonce"));
    Ok(())
}

#[test]
fn missing_payload_defaults_to_null() -> anyhow::Result<()> {
    let decoded: ServiceRequest = serde_json::from_str(
        r#"{"message_id":"m-3","service":"hub.control","action":"status"}"#,
    )?;
    assert!(decoded.payload.is_null());
    Ok(())
}

#[yare::parameterized(
    execute = { "execute", Some(ServiceAction::Execute) },
    list = { "list", Some(ServiceAction::List) },
    status = { "status", Some(ServiceAction::Status) },
    info = { "info", Some(ServiceAction::Info) },
    unknown = { "reboot", None },
    empty = { "", None },
    case_sensitive = { "Execute", None },
)]
fn action_parse(wire: &str, expected: Option<ServiceAction>) {
    assert_eq!(ServiceAction::parse(wire), expected);
}

#[test]
fn error_code_classify_bare_and_detailed() {
    assert_eq!(ServiceErrorCode::classify("no_worker"), Some(ServiceErrorCode::NoWorker));
    assert_eq!(
        ServiceErrorCode::classify("driver_error: tv unreachable"),
        Some(ServiceErrorCode::DriverError)
    );
    assert_eq!(ServiceErrorCode::classify("something else"), None);
}

#[test]
fn error_code_with_detail_round_trips_through_classify() {
    let wire = ServiceErrorCode::DriverError.with_detail("IRCC timeout");
    assert_eq!(wire, "driver_error: IRCC timeout");
    assert_eq!(ServiceErrorCode::classify(&wire), Some(ServiceErrorCode::DriverError));
}
