// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response envelopes carried through the broker.
//!
//! `message_id` correlates one broker-level exchange; `nonce` is opaque to
//! the broker and interpreted only by the hub's device pipeline. Both are
//! echoed verbatim from request to response.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A service request, client → broker → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub message_id: String,
    pub service: String,
    /// Action name as carried on the wire; workers parse it into
    /// [`ServiceAction`] and answer `unknown_action` for anything else.
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl ServiceRequest {
    pub fn new(
        message_id: impl Into<String>,
        service: impl Into<String>,
        action: ServiceAction,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            service: service.into(),
            action: action.as_str().to_owned(),
            payload: serde_json::Value::Null,
            nonce: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// A service response, worker → broker → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub message_id: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResponse {
    /// Successful response echoing the request's correlators.
    pub fn ok(request: &ServiceRequest, data: serde_json::Value) -> Self {
        Self {
            message_id: request.message_id.clone(),
            service: request.service.clone(),
            nonce: request.nonce.clone(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response echoing the request's correlators.
    pub fn error(request: &ServiceRequest, error: impl Into<String>) -> Self {
        Self::failure(&request.message_id, &request.service, request.nonce.clone(), error)
    }

    /// Failed response built from bare correlators (used where no full
    /// request is at hand, e.g. broker-synthesized timeouts).
    pub fn failure(
        message_id: &str,
        service: &str,
        nonce: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.to_owned(),
            service: service.to_owned(),
            nonce,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// The actions a hub worker serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Execute,
    List,
    Status,
    Info,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::List => "list",
            Self::Status => "status",
            Self::Info => "info",
        }
    }

    /// Parse a wire action name. Returns `None` for unknown actions.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "execute" => Some(Self::Execute),
            "list" => Some(Self::List),
            "status" => Some(Self::Status),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known error codes carried in [`ServiceResponse::error`].
///
/// Driver failures travel as `driver_error: <message>`; everything else is
/// the bare code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorCode {
    BadRequest,
    UnknownAction,
    DeviceNotFound,
    DriverError,
    InvalidNonce,
    NoWorker,
    Timeout,
    WorkerGone,
    Superseded,
    Internal,
}

impl ServiceErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::UnknownAction => "unknown_action",
            Self::DeviceNotFound => "device_not_found",
            Self::DriverError => "driver_error",
            Self::InvalidNonce => "invalid_nonce",
            Self::NoWorker => "no_worker",
            Self::Timeout => "timeout",
            Self::WorkerGone => "worker_gone",
            Self::Superseded => "superseded",
            Self::Internal => "internal",
        }
    }

    /// Attach a human-readable detail, `<code>: <detail>`.
    pub fn with_detail(&self, detail: impl fmt::Display) -> String {
        format!("{}: {detail}", self.as_str())
    }

    /// Classify a wire error string back into its code.
    ///
    /// Accepts both the bare code and the `<code>: <detail>` form.
    pub fn classify(error: &str) -> Option<Self> {
        let code = error.split(':').next().unwrap_or(error).trim();
        match code {
            "bad_request" => Some(Self::BadRequest),
            "unknown_action" => Some(Self::UnknownAction),
            "device_not_found" => Some(Self::DeviceNotFound),
            "driver_error" => Some(Self::DriverError),
            "invalid_nonce" => Some(Self::InvalidNonce),
            "no_worker" => Some(Self::NoWorker),
            "timeout" => Some(Self::Timeout),
            "worker_gone" => Some(Self::WorkerGone),
            "superseded" => Some(Self::Superseded),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
