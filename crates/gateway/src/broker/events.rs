// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker lifecycle events.
//!
//! The monitor subscribes to these instead of reaching into broker tables;
//! the broker never calls outward. This keeps the broker ↔ hub-service
//! dependency one-directional.

/// Events emitted by the broker loop on its broadcast channel.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A worker registered (first session or a replacing reconnect).
    WorkerAdded { identity: String, service: String },
    /// A worker tore its session down, or the socket dropped.
    WorkerDisconnected { identity: String, service: String },
    /// A worker was evicted after missing heartbeats past the liveness
    /// window.
    WorkerExpired { identity: String, service: String },
    /// A reply arrived for a request no longer pending (fire-and-forget
    /// completions and post-timeout stragglers). Correlated by nonce for
    /// observability; never routed.
    OrphanReply {
        identity: String,
        message_id: String,
        nonce: Option<String>,
        success: bool,
    },
}
