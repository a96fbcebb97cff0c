// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use hearth_proto::ServiceErrorCode;

/// Error codes for the gateway HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    Unauthorized,
    Forbidden,
    BadRequest,
    NotFound,
    Conflict,
    NoWorker,
    Timeout,
    Internal,
}

impl GatewayError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::NoWorker => 503,
            Self::Timeout => 504,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::NoWorker => "NO_WORKER",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// Map a wire error string from a [`hearth_proto::ServiceResponse`] to
    /// its HTTP surface.
    pub fn from_wire(error: &str) -> Self {
        match ServiceErrorCode::classify(error) {
            Some(
                ServiceErrorCode::BadRequest
                | ServiceErrorCode::UnknownAction
                | ServiceErrorCode::InvalidNonce,
            ) => Self::BadRequest,
            Some(ServiceErrorCode::DeviceNotFound) => Self::NotFound,
            Some(ServiceErrorCode::NoWorker | ServiceErrorCode::WorkerGone) => Self::NoWorker,
            Some(ServiceErrorCode::Timeout) => Self::Timeout,
            Some(ServiceErrorCode::Superseded) => Self::Conflict,
            Some(ServiceErrorCode::DriverError | ServiceErrorCode::Internal) | None => {
                Self::Internal
            }
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
