// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declared device inventory, loaded from the hub's configuration file.
//!
//! The inventory is static: `list` replies are served from it without any
//! driver network calls, so listing works with every device offline.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One configured device and its driver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub device_id: String,
    /// Driver selector (e.g. "bravia", "loopback").
    pub device_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    /// Network address of the device on the LAN.
    #[serde(default)]
    pub address: String,
    /// Unordered capability tags.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Driver-specific parameters, passed through opaquely.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl DeviceSpec {
    /// Inventory entry as carried in `list` replies.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "device_id": self.device_id,
            "device_type": self.device_type,
            "name": self.name,
            "model": self.model,
            "address": self.address,
            "capabilities": self.capabilities,
        })
    }
}

/// Load the device inventory from a JSON file.
///
/// Duplicate device ids are rejected: the inventory keys drivers and the
/// dedup cache by `device_id`.
pub fn load_inventory(path: &Path) -> anyhow::Result<Vec<DeviceSpec>> {
    let contents = std::fs::read_to_string(path)?;
    let devices: Vec<DeviceSpec> = serde_json::from_str(&contents)?;
    let mut seen = std::collections::HashSet::new();
    for device in &devices {
        if device.device_id.is_empty() {
            anyhow::bail!("device with empty device_id in {}", path.display());
        }
        if !seen.insert(device.device_id.as_str()) {
            anyhow::bail!("duplicate device_id {:?} in {}", device.device_id, path.display());
        }
    }
    Ok(devices)
}

#[cfg(test)]
#[path = "devices_tests.rs"]
mod tests;
