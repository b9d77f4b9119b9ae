// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    session_not_found = { MeshError::SessionNotFound, 404 },
    terminal_not_found = { MeshError::TerminalNotFound, 404 },
    request_gone = { MeshError::RequestGone, 404 },
    snapshot_not_found = { MeshError::SnapshotNotFound, 404 },
    session_exists = { MeshError::SessionExists, 409 },
    invalid_state = { MeshError::InvalidState, 409 },
    incompatible_version = { MeshError::IncompatibleVersion, 409 },
    provider_not_found = { MeshError::ProviderNotFound, 400 },
    terminal_not_supported = { MeshError::TerminalNotSupported, 400 },
    bad_request = { MeshError::BadRequest, 400 },
    queue_full = { MeshError::QueueFull, 429 },
    buffer_full = { MeshError::BufferFull, 429 },
    timeout = { MeshError::Timeout, 504 },
    forbidden = { MeshError::Forbidden, 403 },
    shutting_down = { MeshError::ShuttingDown, 503 },
    internal = { MeshError::Internal, 500 },
)]
fn http_status_mapping(code: MeshError, status: u16) {
    assert_eq!(code.http_status(), status);
}

#[test]
fn error_body_carries_code_and_message() {
    let body = MeshError::InvalidState.to_error_body("cannot pause from created");
    assert_eq!(body.code, "INVALID_STATE");
    assert_eq!(body.message, "cannot pause from created");
}

#[test]
fn display_matches_wire_code() {
    assert_eq!(MeshError::QueueFull.to_string(), "QUEUE_FULL");
}

#[test]
fn envelope_serializes_under_error_key() -> anyhow::Result<()> {
    let body = ErrorResponse { error: MeshError::Timeout.to_error_body("dock request timed out") };
    let json = serde_json::to_value(&body)?;
    assert_eq!(json["error"]["code"], "TIMEOUT");
    Ok(())
}
