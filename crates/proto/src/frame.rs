// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker frames: the verbs exchanged between clients, the broker, and
//! workers. JSON text on every frame, discriminated by `verb`.
//!
//! Workers see `ready`/`dispatch`/`reply`/`heartbeat`/`disconnect` on the
//! WebSocket; `request`/`request_nf`/`deliver` model the client side of the
//! same protocol (in-process for the gateway's own handlers).

use serde::{Deserialize, Serialize};

use crate::envelope::{ServiceRequest, ServiceResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Frame {
    /// Worker → broker: advertise a service under an identity.
    Ready {
        service: String,
        identity: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_key: Option<String>,
    },
    /// Client → broker: awaited request; the broker tracks a pending entry.
    Request {
        request: ServiceRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Client → broker: fire-and-forget; any later reply is not awaited.
    RequestNf { request: ServiceRequest },
    /// Broker → worker: routed request plus the originating client id.
    Dispatch { client: String, request: ServiceRequest },
    /// Worker → broker: response to a dispatched request.
    Reply { response: ServiceResponse },
    /// Broker → client: routed response.
    Deliver { response: ServiceResponse },
    /// Keepalive, both directions.
    Heartbeat,
    /// Session tear-down, either direction.
    Disconnect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Frame {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
