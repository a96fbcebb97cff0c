// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub-scoped request counters and latency accounting.

use serde::Serialize;
use tokio::sync::RwLock;

/// Smoothing factor for the latency moving average.
const EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Default)]
struct MetricsInner {
    processed: u64,
    failed: u64,
    avg_latency_ms: Option<f64>,
    last_latency_ms: f64,
}

/// Snapshot returned by the `status` action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub last_latency_ms: f64,
}

/// Shared counters, safe to record from concurrent request tasks.
#[derive(Default)]
pub struct HubMetrics {
    inner: RwLock<MetricsInner>,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one handled request.
    pub async fn record(&self, success: bool, latency: std::time::Duration) {
        let sample_ms = latency.as_secs_f64() * 1000.0;
        let mut inner = self.inner.write().await;
        inner.processed += 1;
        if !success {
            inner.failed += 1;
        }
        inner.last_latency_ms = sample_ms;
        inner.avg_latency_ms = Some(match inner.avg_latency_ms {
            Some(avg) => EMA_ALPHA * sample_ms + (1.0 - EMA_ALPHA) * avg,
            None => sample_ms,
        });
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        let error_rate = if inner.processed == 0 {
            0.0
        } else {
            inner.failed as f64 / inner.processed as f64
        };
        MetricsSnapshot {
            processed: inner.processed,
            failed: inner.failed,
            error_rate,
            avg_latency_ms: inner.avg_latency_ms.unwrap_or(0.0),
            last_latency_ms: inner.last_latency_ms,
        }
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
