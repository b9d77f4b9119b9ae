// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes shared across the HTTP, SSE, and WebSocket surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshError {
    SessionNotFound,
    TerminalNotFound,
    RequestGone,
    SnapshotNotFound,
    SessionExists,
    InvalidState,
    IncompatibleVersion,
    ProviderNotFound,
    TerminalNotSupported,
    BadRequest,
    QueueFull,
    BufferFull,
    Timeout,
    Forbidden,
    ShuttingDown,
    Internal,
}

impl MeshError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::SessionNotFound
            | Self::TerminalNotFound
            | Self::RequestGone
            | Self::SnapshotNotFound => 404,
            Self::SessionExists | Self::InvalidState | Self::IncompatibleVersion => 409,
            Self::ProviderNotFound | Self::TerminalNotSupported | Self::BadRequest => 400,
            Self::QueueFull | Self::BufferFull => 429,
            Self::Timeout => 504,
            Self::Forbidden => 403,
            Self::ShuttingDown => 503,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::TerminalNotFound => "TERMINAL_NOT_FOUND",
            Self::RequestGone => "REQUEST_GONE",
            Self::SnapshotNotFound => "SNAPSHOT_NOT_FOUND",
            Self::SessionExists => "SESSION_EXISTS",
            Self::InvalidState => "INVALID_STATE",
            Self::IncompatibleVersion => "INCOMPATIBLE_VERSION",
            Self::ProviderNotFound => "PROVIDER_NOT_FOUND",
            Self::TerminalNotSupported => "TERMINAL_NOT_SUPPORTED",
            Self::BadRequest => "BAD_REQUEST",
            Self::QueueFull => "QUEUE_FULL",
            Self::BufferFull => "BUFFER_FULL",
            Self::Timeout => "TIMEOUT",
            Self::Forbidden => "FORBIDDEN",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Internal => "INTERNAL",
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

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for MeshError {}

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

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
