// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device drivers: one implementation per `device_type`, resolved through
//! a registry keyed by `device_id`.
//!
//! Drivers are synchronous — the dispatch pipeline runs them on blocking
//! tasks, one in flight per device.

pub mod bravia;
pub mod loopback;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::devices::DeviceSpec;

/// Failure reported by a driver. Terminal for the nonce that carried it.
#[derive(Debug, Clone)]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DriverError {}

/// Static driver metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DriverInfo {
    pub device_type: String,
    pub description: String,
}

/// A device-protocol adapter: one synchronous operation plus metadata.
pub trait DeviceDriver: Send + Sync {
    /// Execute a driver-specific action blob against the device.
    fn process(&self, action: &Value) -> Result<Value, DriverError>;

    /// Driver metadata.
    fn info(&self) -> DriverInfo;
}

/// Drivers resolved per configured device.
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DeviceDriver>>,
}

impl DriverRegistry {
    /// Build drivers for every inventory entry by `device_type`.
    pub fn from_inventory(devices: &[DeviceSpec]) -> Self {
        let mut drivers: HashMap<String, Arc<dyn DeviceDriver>> = HashMap::new();
        for spec in devices {
            drivers.insert(spec.device_id.clone(), build_driver(spec));
        }
        Self { drivers }
    }

    /// Replace the driver for one device (used by tests and development
    /// setups to inject doubles).
    pub fn insert(&mut self, device_id: impl Into<String>, driver: Arc<dyn DeviceDriver>) {
        self.drivers.insert(device_id.into(), driver);
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<dyn DeviceDriver>> {
        self.drivers.get(device_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Select a driver implementation for a device spec.
pub fn build_driver(spec: &DeviceSpec) -> Arc<dyn DeviceDriver> {
    match spec.device_type.as_str() {
        "bravia" => Arc::new(bravia::BraviaDriver::new(spec)),
        "loopback" => Arc::new(loopback::LoopbackDriver::default()),
        other => Arc::new(UnsupportedDriver { device_type: other.to_owned() }),
    }
}

/// Fallback for device types with no adapter. Every action fails.
struct UnsupportedDriver {
    device_type: String,
}

impl DeviceDriver for UnsupportedDriver {
    fn process(&self, _action: &Value) -> Result<Value, DriverError> {
        Err(DriverError::new(format!("no driver for device type {:?}", self.device_type)))
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            device_type: self.device_type.clone(),
            description: "unsupported device type".to_owned(),
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
