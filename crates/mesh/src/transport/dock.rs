// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dock MCP endpoints: long-poll for the in-session worker, enqueue +
//! await for HTTP callers, and response delivery.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::dock::{DockBridge, DockRequest, DockRequestKind, DockResponse};
use crate::error::MeshError;
use crate::state::MeshState;

/// Longest wait `next` will hold a poll open.
const MAX_POLL: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub kind: DockRequestKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Resolve the session's dock bridge, or the right error for why not.
async fn bridge_for(
    s: &MeshState,
    session_id: &str,
) -> Result<(Arc<DockBridge>, tokio_util::sync::CancellationToken), (StatusCode, Json<crate::error::ErrorResponse>)>
{
    let record = s
        .executor
        .get_session(session_id)
        .await
        .map_err(|e| e.to_http_response("session not found"))?;
    let bridge = record
        .dock
        .as_ref()
        .ok_or_else(|| MeshError::BadRequest.to_http_response("not a dock session"))?;
    Ok((Arc::clone(bridge), record.cancel.clone()))
}

/// `GET /api/sessions/{id}/dock/mcp/next` — long-poll the next request.
pub async fn next_request(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    Query(query): Query<NextQuery>,
) -> impl IntoResponse {
    let (bridge, cancel) = match bridge_for(&s, &id).await {
        Ok(pair) => pair,
        Err(response) => return response.into_response(),
    };

    let wait = query
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(MAX_POLL)
        .min(MAX_POLL);

    match tokio::time::timeout(wait, bridge.next(&cancel)).await {
        Ok(Some(request)) => Json(request).into_response(),
        Ok(None) | Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `POST /api/sessions/{id}/dock/mcp/request` — enqueue and await.
pub async fn enqueue_request(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> impl IntoResponse {
    let (bridge, cancel) = match bridge_for(&s, &id).await {
        Ok(pair) => pair,
        Err(response) => return response.into_response(),
    };

    let request = DockRequest {
        id: uuid::Uuid::new_v4().to_string(),
        kind: req.kind,
        payload: req.payload,
    };
    match bridge.enqueue(&cancel, request).await {
        Ok(response) => Json(response).into_response(),
        Err(MeshError::QueueFull) => {
            MeshError::QueueFull.to_http_response("dock queue is full").into_response()
        }
        Err(e) => e.to_http_response("dock worker did not respond").into_response(),
    }
}

/// `POST /api/sessions/{id}/dock/mcp/respond` — deliver a worker response.
pub async fn respond(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    Json(response): Json<DockResponse>,
) -> impl IntoResponse {
    if response.id.is_empty() {
        return MeshError::BadRequest.to_http_response("response id is required").into_response();
    }
    let (bridge, _cancel) = match bridge_for(&s, &id).await {
        Ok(pair) => pair,
        Err(response) => return response.into_response(),
    };
    match bridge.respond(response) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.to_http_response("no pending request with that id").into_response(),
    }
}
