// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device nonce dedup cache.
//!
//! Maps `(device_id, nonce)` to the outcome of the command that first
//! carried the nonce. A repeated nonce replays the stored outcome without
//! re-invoking the driver, masking client and network retries. Failures
//! are cached too: a driver error is the canonical outcome for its nonce.
//!
//! Bounded LRU per device (touch = move to back, evict from the front),
//! entries expire after a TTL, and a background sweeper drops expired
//! entries and empty device buckets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cached outcome of one command: the response fields minus correlators.
///
/// A replay carries these verbatim under the *current* request's
/// `message_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

struct NonceRecord {
    outcome: CachedOutcome,
    inserted_at: Instant,
}

#[derive(Default)]
struct DeviceBucket {
    entries: IndexMap<String, NonceRecord>,
}

/// The dedup cache. All operations are infallible; losing the cache (a
/// process restart) degrades idempotency to best-effort.
pub struct NonceCache {
    /// Coarse lock held only to look up or insert a device bucket.
    buckets: RwLock<HashMap<String, Arc<Mutex<DeviceBucket>>>>,
    capacity: usize,
    ttl: Duration,
}

impl NonceCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { buckets: RwLock::new(HashMap::new()), capacity, ttl }
    }

    /// Look up a nonce for a device.
    ///
    /// A hit refreshes the entry's recency. An expired entry is removed
    /// and reported as a miss.
    pub async fn check(&self, device_id: &str, nonce: &str) -> Option<CachedOutcome> {
        let bucket = {
            let buckets = self.buckets.read().await;
            buckets.get(device_id).cloned()
        }?;

        let mut bucket = bucket.lock().await;
        let record = bucket.entries.get(nonce)?;
        if record.inserted_at.elapsed() >= self.ttl {
            bucket.entries.shift_remove(nonce);
            return None;
        }
        // Touch: move to the back (most recently used).
        let record = bucket.entries.shift_remove(nonce)?;
        let outcome = record.outcome.clone();
        bucket.entries.insert(nonce.to_owned(), record);
        Some(outcome)
    }

    /// Record the outcome for a nonce, evicting the least-recently-used
    /// entries beyond the per-device capacity.
    pub async fn store(&self, device_id: &str, nonce: &str, outcome: CachedOutcome) {
        let bucket = self.bucket_for(device_id).await;
        let mut bucket = bucket.lock().await;
        bucket.entries.shift_remove(nonce);
        bucket
            .entries
            .insert(nonce.to_owned(), NonceRecord { outcome, inserted_at: Instant::now() });
        while bucket.entries.len() > self.capacity {
            bucket.entries.shift_remove_index(0);
        }
    }

    /// Drop every record for a device.
    pub async fn clear(&self, device_id: &str) {
        let mut buckets = self.buckets.write().await;
        buckets.remove(device_id);
    }

    /// Records currently held for one device.
    pub async fn device_count(&self, device_id: &str) -> usize {
        let bucket = {
            let buckets = self.buckets.read().await;
            buckets.get(device_id).cloned()
        };
        match bucket {
            Some(bucket) => bucket.lock().await.entries.len(),
            None => 0,
        }
    }

    /// Records currently held across all devices.
    pub async fn total_count(&self) -> usize {
        let buckets: Vec<_> = {
            let map = self.buckets.read().await;
            map.values().cloned().collect()
        };
        let mut total = 0;
        for bucket in buckets {
            total += bucket.lock().await.entries.len();
        }
        total
    }

    /// Drop expired entries everywhere and remove emptied buckets.
    pub async fn sweep(&self) {
        let snapshot: Vec<(String, Arc<Mutex<DeviceBucket>>)> = {
            let map = self.buckets.read().await;
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let mut emptied = Vec::new();
        for (device_id, bucket) in snapshot {
            let mut bucket = bucket.lock().await;
            bucket.entries.retain(|_, record| record.inserted_at.elapsed() < self.ttl);
            if bucket.entries.is_empty() {
                emptied.push(device_id);
            }
        }

        if !emptied.is_empty() {
            let mut map = self.buckets.write().await;
            for device_id in emptied {
                // Re-check under the write lock: a store may have raced in.
                let still_empty = match map.get(&device_id) {
                    Some(bucket) => bucket.try_lock().map(|b| b.entries.is_empty()).unwrap_or(false),
                    None => false,
                };
                if still_empty {
                    map.remove(&device_id);
                    debug!(device_id, "dropped empty nonce bucket");
                }
            }
        }
    }

    async fn bucket_for(&self, device_id: &str) -> Arc<Mutex<DeviceBucket>> {
        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(device_id) {
                return Arc::clone(bucket);
            }
        }
        let mut buckets = self.buckets.write().await;
        Arc::clone(buckets.entry(device_id.to_owned()).or_default())
    }
}

/// Spawn the periodic sweeper.
pub fn spawn_sweeper(cache: Arc<NonceCache>, interval: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it.
        timer.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            cache.sweep().await;
        }
    });
}

#[cfg(test)]
#[path = "nonce_cache_tests.rs"]
mod tests;
