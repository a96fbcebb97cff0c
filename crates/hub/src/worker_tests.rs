// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[test]
fn backoff_doubles_to_the_ceiling() {
    let max = Duration::from_secs(60);
    let mut delay = Duration::from_secs(10);
    let mut observed = Vec::new();
    for _ in 0..5 {
        delay = next_backoff(delay, max);
        observed.push(delay.as_secs());
    }
    assert_eq!(observed, vec![20, 40, 60, 60, 60]);
}

#[test]
fn backoff_never_exceeds_ceiling_from_odd_start() {
    let delay = next_backoff(Duration::from_secs(45), Duration::from_secs(60));
    assert_eq!(delay, Duration::from_secs(60));
}

#[test]
fn salvage_finds_dispatch_message_id() {
    let text = r#"{"verb":"dispatch","request":{"message_id":"m-42","bogus":true}}"#;
    assert_eq!(salvage_message_id(text), Some("m-42".to_owned()));
}

#[test]
fn salvage_finds_top_level_message_id() {
    let text = r#"{"message_id":"m-7","action":12}"#;
    assert_eq!(salvage_message_id(text), Some("m-7".to_owned()));
}

#[test]
fn salvage_gives_up_on_garbage() {
    assert_eq!(salvage_message_id("not json"), None);
    assert_eq!(salvage_message_id(r#"{"no_id":true}"#), None);
}

#[test]
fn session_state_names() {
    assert_eq!(SessionState::Connecting.as_str(), "connecting");
    assert_eq!(SessionState::Ready.as_str(), "ready");
    assert_eq!(SessionState::Handling.as_str(), "handling");
    assert_eq!(SessionState::Backoff.as_str(), "backoff");
    assert_eq!(SessionState::Disconnected.as_str(), "disconnected");
}
