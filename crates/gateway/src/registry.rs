// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory service registry.
//!
//! Tracks which hubs provide which device types under synthetic
//! `device.<type>` names, with aggregated capabilities and health.
//! Informational only: command routing is by hub id and never consults
//! this registry.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    /// Providing hubs and when each was last seen alive.
    providers: HashMap<String, Instant>,
    capabilities: BTreeSet<String>,
}

/// Serializable snapshot for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub providers: Vec<String>,
    pub capabilities: Vec<String>,
    /// At least one provider seen within the liveness window.
    pub healthy: bool,
    pub last_seen_secs_ago: u64,
}

pub struct ServiceRegistry {
    inner: RwLock<HashMap<String, Entry>>,
    stale_after: Duration,
    live_window: Duration,
}

impl ServiceRegistry {
    pub fn new(stale_after: Duration, live_window: Duration) -> Self {
        Self { inner: RwLock::new(HashMap::new()), stale_after, live_window }
    }

    /// Synthetic service name for a device type.
    pub fn service_name(device_type: &str) -> String {
        format!("device.{device_type}")
    }

    /// Fold one hub's inventory into the registry.
    pub async fn record_inventory(&self, hub_id: &str, devices: &[(String, Vec<String>)]) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        for (device_type, capabilities) in devices {
            let entry = inner
                .entry(Self::service_name(device_type))
                .or_insert_with(|| Entry { providers: HashMap::new(), capabilities: BTreeSet::new() });
            entry.providers.insert(hub_id.to_owned(), now);
            entry.capabilities.extend(capabilities.iter().cloned());
        }
    }

    /// Refresh a live provider everywhere it appears.
    pub async fn touch_provider(&self, hub_id: &str) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        for entry in inner.values_mut() {
            if let Some(seen) = entry.providers.get_mut(hub_id) {
                *seen = now;
            }
        }
    }

    /// Drop a provider that went away; emptied entries age out via
    /// [`ServiceRegistry::cleanup`].
    pub async fn remove_provider(&self, hub_id: &str) {
        let mut inner = self.inner.write().await;
        for entry in inner.values_mut() {
            entry.providers.remove(hub_id);
        }
    }

    /// Remove entries with no provider seen within the staleness cutoff.
    pub async fn cleanup(&self) {
        let mut inner = self.inner.write().await;
        inner.retain(|service, entry| {
            let keep = entry
                .providers
                .values()
                .any(|seen| seen.elapsed() < self.stale_after);
            if !keep {
                debug!(service, "dropping stale service entry");
            }
            keep
        });
    }

    pub async fn snapshot(&self) -> Vec<ServiceInfo> {
        let inner = self.inner.read().await;
        let mut services: Vec<ServiceInfo> = inner
            .iter()
            .map(|(service, entry)| {
                let newest = entry.providers.values().map(|seen| seen.elapsed()).min();
                let mut providers: Vec<String> = entry.providers.keys().cloned().collect();
                providers.sort();
                ServiceInfo {
                    service: service.clone(),
                    providers,
                    capabilities: entry.capabilities.iter().cloned().collect(),
                    healthy: newest.map(|age| age < self.live_window).unwrap_or(false),
                    last_seen_secs_ago: newest.unwrap_or(Duration::MAX).as_secs(),
                }
            })
            .collect();
        services.sort_by(|a, b| a.service.cmp(&b.service));
        services
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
