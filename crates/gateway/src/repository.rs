// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hub/device directory.
//!
//! Persistence lives behind the [`Repository`] trait; the default
//! implementation is in-memory. Inserts are idempotent, updates are keyed
//! by stable ids, and the trait accepts concurrent use — the semantics a
//! SQL backing store would provide.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Hub reachability, reconciled from broker liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HubStatus {
    Online,
    Offline,
}

/// Device reachability as last reported by its hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubRecord {
    pub hub_id: String,
    /// Z85 public key; empty for hubs first seen as broker workers.
    pub public_key: String,
    pub name: String,
    /// Claim secret. Unique across hubs.
    pub product_key: String,
    /// Owner; `None` until claimed.
    pub user_id: Option<String>,
    pub auto_registered: bool,
    pub status: HubStatus,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub device_type: String,
    pub name: String,
    pub model: String,
    pub address: String,
    pub capabilities: Vec<String>,
    pub status: DeviceStatus,
}

/// Registration-time hub facts.
#[derive(Debug, Clone)]
pub struct NewHub {
    pub hub_id: String,
    pub public_key: String,
    pub name: String,
    pub product_key: String,
}

/// Repository failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    NotFound,
    Conflict,
    Internal(String),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Conflict => f.write_str("conflict"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for RepoError {}

#[async_trait]
pub trait Repository: Send + Sync {
    // -- users ---------------------------------------------------------------

    async fn create_user(&self, user_id: &str, name: &str) -> Result<UserRecord, RepoError>;
    async fn user(&self, user_id: &str) -> Result<Option<UserRecord>, RepoError>;

    // -- hubs ----------------------------------------------------------------

    /// Registration-handshake insert. Idempotent by `hub_id`: an existing
    /// record keeps its owner; a record first created as a bare worker
    /// identity adopts the registered key and product key.
    async fn register_hub(&self, new: NewHub) -> Result<HubRecord, RepoError>;

    /// Minimal idempotent insert for a hub first seen as a broker worker.
    async fn ensure_hub(&self, hub_id: &str) -> Result<HubRecord, RepoError>;

    async fn hub(&self, hub_id: &str) -> Result<Option<HubRecord>, RepoError>;
    async fn list_hubs(&self) -> Result<Vec<HubRecord>, RepoError>;

    /// Claim by product key: sets the owner and clears `auto_registered`.
    /// Conflict when the hub is already claimed.
    async fn claim_hub(&self, user_id: &str, product_key: &str) -> Result<HubRecord, RepoError>;

    /// Flip hub status; refreshes `last_seen` when flipping online.
    async fn set_hub_status(&self, hub_id: &str, status: HubStatus) -> Result<(), RepoError>;

    // -- devices -------------------------------------------------------------

    /// Upsert one device under a hub, keyed `(hub_id, device_id)`.
    async fn upsert_device(&self, hub_id: &str, device: DeviceRecord) -> Result<(), RepoError>;

    async fn devices_for_hub(&self, hub_id: &str) -> Result<Vec<DeviceRecord>, RepoError>;

    /// Flip every device of a hub (offline cascade on worker loss).
    async fn set_devices_status(
        &self,
        hub_id: &str,
        status: DeviceStatus,
    ) -> Result<(), RepoError>;

    /// Every `(hub, device)` pair carrying this device id, across hubs.
    async fn device_with_hub(
        &self,
        device_id: &str,
    ) -> Result<Vec<(HubRecord, DeviceRecord)>, RepoError>;
}

// -- In-memory implementation -------------------------------------------------

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    hubs: HashMap<String, HubRecord>,
    /// hub_id → device_id → record.
    devices: HashMap<String, HashMap<String, DeviceRecord>>,
}

/// In-memory repository. The default store; a SQL store slots in behind
/// the same trait.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user_id: &str, name: &str) -> Result<UserRecord, RepoError> {
        let mut inner = self.inner.write().await;
        if inner.users.contains_key(user_id) {
            return Err(RepoError::Conflict);
        }
        let user = UserRecord { user_id: user_id.to_owned(), name: name.to_owned() };
        inner.users.insert(user_id.to_owned(), user.clone());
        Ok(user)
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }

    async fn register_hub(&self, new: NewHub) -> Result<HubRecord, RepoError> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.hubs.get(&new.hub_id).cloned() {
            // Idempotent re-registration: preserve the owner. A hub first
            // inserted as a bare worker identity (no key) adopts the real
            // key and printed product key now, so a later claim works.
            let adopt_product_key = existing.public_key.is_empty()
                && existing.auto_registered
                && existing.user_id.is_none()
                && existing.product_key != new.product_key;
            if adopt_product_key {
                let taken = inner
                    .hubs
                    .values()
                    .any(|h| h.hub_id != new.hub_id && h.product_key == new.product_key);
                if taken {
                    return Err(RepoError::Conflict);
                }
            }
            let hub = inner
                .hubs
                .get_mut(&new.hub_id)
                .ok_or_else(|| RepoError::Internal("hub vanished".to_owned()))?;
            if hub.public_key.is_empty() && !new.public_key.is_empty() {
                hub.public_key = new.public_key;
            }
            if hub.name.is_empty() {
                hub.name = new.name;
            }
            if adopt_product_key {
                hub.product_key = new.product_key;
            }
            return Ok(hub.clone());
        }

        let taken = inner.hubs.values().any(|h| h.product_key == new.product_key);
        if taken {
            return Err(RepoError::Conflict);
        }
        let hub = HubRecord {
            hub_id: new.hub_id.clone(),
            public_key: new.public_key,
            name: new.name,
            product_key: new.product_key,
            user_id: None,
            auto_registered: true,
            status: HubStatus::Offline,
            last_seen: Utc::now(),
        };
        inner.hubs.insert(new.hub_id, hub.clone());
        Ok(hub)
    }

    async fn ensure_hub(&self, hub_id: &str) -> Result<HubRecord, RepoError> {
        let mut inner = self.inner.write().await;
        if let Some(hub) = inner.hubs.get(hub_id) {
            return Ok(hub.clone());
        }
        let hub = HubRecord {
            hub_id: hub_id.to_owned(),
            public_key: String::new(),
            name: hub_id.to_owned(),
            // Generated: the product-key uniqueness constraint holds even
            // for hubs that never registered over HTTP.
            product_key: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            auto_registered: true,
            status: HubStatus::Offline,
            last_seen: Utc::now(),
        };
        inner.hubs.insert(hub_id.to_owned(), hub.clone());
        Ok(hub)
    }

    async fn hub(&self, hub_id: &str) -> Result<Option<HubRecord>, RepoError> {
        Ok(self.inner.read().await.hubs.get(hub_id).cloned())
    }

    async fn list_hubs(&self) -> Result<Vec<HubRecord>, RepoError> {
        let inner = self.inner.read().await;
        let mut hubs: Vec<_> = inner.hubs.values().cloned().collect();
        hubs.sort_by(|a, b| a.hub_id.cmp(&b.hub_id));
        Ok(hubs)
    }

    async fn claim_hub(&self, user_id: &str, product_key: &str) -> Result<HubRecord, RepoError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(user_id) {
            return Err(RepoError::NotFound);
        }
        let hub = inner
            .hubs
            .values_mut()
            .find(|h| h.product_key == product_key)
            .ok_or(RepoError::NotFound)?;
        if hub.user_id.is_some() && !hub.auto_registered {
            return Err(RepoError::Conflict);
        }
        hub.user_id = Some(user_id.to_owned());
        hub.auto_registered = false;
        Ok(hub.clone())
    }

    async fn set_hub_status(&self, hub_id: &str, status: HubStatus) -> Result<(), RepoError> {
        let mut inner = self.inner.write().await;
        let hub = inner.hubs.get_mut(hub_id).ok_or(RepoError::NotFound)?;
        hub.status = status;
        if status == HubStatus::Online {
            hub.last_seen = Utc::now();
        }
        Ok(())
    }

    async fn upsert_device(&self, hub_id: &str, device: DeviceRecord) -> Result<(), RepoError> {
        let mut inner = self.inner.write().await;
        if !inner.hubs.contains_key(hub_id) {
            return Err(RepoError::NotFound);
        }
        inner
            .devices
            .entry(hub_id.to_owned())
            .or_default()
            .insert(device.device_id.clone(), device);
        Ok(())
    }

    async fn devices_for_hub(&self, hub_id: &str) -> Result<Vec<DeviceRecord>, RepoError> {
        let inner = self.inner.read().await;
        let mut devices: Vec<_> = inner
            .devices
            .get(hub_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    async fn set_devices_status(
        &self,
        hub_id: &str,
        status: DeviceStatus,
    ) -> Result<(), RepoError> {
        let mut inner = self.inner.write().await;
        if let Some(devices) = inner.devices.get_mut(hub_id) {
            for device in devices.values_mut() {
                device.status = status;
            }
        }
        Ok(())
    }

    async fn device_with_hub(
        &self,
        device_id: &str,
    ) -> Result<Vec<(HubRecord, DeviceRecord)>, RepoError> {
        let inner = self.inner.read().await;
        let mut found = Vec::new();
        for (hub_id, devices) in &inner.devices {
            if let Some(device) = devices.get(device_id) {
                if let Some(hub) = inner.hubs.get(hub_id) {
                    found.push((hub.clone(), device.clone()));
                }
            }
        }
        found.sort_by(|a, b| a.0.hub_id.cmp(&b.0.hub_id));
        Ok(found)
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
