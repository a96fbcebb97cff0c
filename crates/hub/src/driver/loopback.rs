// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback driver: acknowledges every action without touching hardware.
//!
//! Used for development setups and tests; counts invocations so callers
//! can assert on execution (the dedup cache must keep this at one per
//! nonce).

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use super::{DeviceDriver, DriverError, DriverInfo};

#[derive(Default)]
pub struct LoopbackDriver {
    invocations: AtomicU64,
}

impl LoopbackDriver {
    /// How many times `process` has run.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl DeviceDriver for LoopbackDriver {
    fn process(&self, action: &Value) -> Result<Value, DriverError> {
        let n = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        if action.get("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Err(DriverError::new("loopback failure requested"));
        }
        Ok(serde_json::json!({"echo": action, "invocation": n}))
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            device_type: "loopback".to_owned(),
            description: "in-memory loopback".to_owned(),
        }
    }
}
