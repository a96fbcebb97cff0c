// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hearth wire protocol: request/response envelopes, broker frames,
//! nonce format, and Z85 key material shared by the gateway and hubs.

pub mod envelope;
pub mod frame;
pub mod keys;
pub mod nonce;

pub use envelope::{ServiceAction, ServiceErrorCode, ServiceRequest, ServiceResponse};
pub use frame::Frame;

/// The service every hub worker advertises.
pub const HUB_CONTROL_SERVICE: &str = "hub.control";
