// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers for sessions, messages, and terminal reads.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;
use crate::session::{
    McpServerConfig, MessageRecord, SessionConfig, SessionKind, SessionStatus, TaskMeta,
};
use crate::state::MeshState;
use crate::terminal::{TerminalRecord, TerminalSnapshot};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub provider_type: Option<String>,
    #[serde(default)]
    pub session_kind: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub provider_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageAccepted {
    pub delivered: bool,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Serialize)]
pub struct TerminalListResponse {
    pub terminals: Vec<TerminalRecord>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
    pub subscriber_count: usize,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<MeshState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: if s.executor.is_accepting() { "running".to_owned() } else { "draining".to_owned() },
        session_count: s.executor.session_count().await,
        subscriber_count: s.executor.broadcaster().subscriber_count(),
    })
}

/// `POST /api/sessions` — create and start a session.
pub async fn create_session(
    State(s): State<Arc<MeshState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let provider_type = match req.provider_type.as_deref() {
        Some(p) if !p.is_empty() => p.to_owned(),
        _ => {
            return MeshError::BadRequest
                .to_http_response("provider_type is required")
                .into_response()
        }
    };

    let kind = match req.session_kind.as_deref() {
        None | Some("interactive") => SessionKind::Interactive,
        Some("dock") => SessionKind::Dock,
        Some(other) => {
            return MeshError::BadRequest
                .to_http_response(format!("invalid session_kind: {other}"))
                .into_response()
        }
    };

    // `agent_id` selects a pre-registered agent backend; unknown names are a
    // 404 rather than a bad request so clients can distinguish.
    if let Some(ref agent_id) = req.agent_id {
        if !s.executor.has_provider(agent_id) {
            return MeshError::SessionNotFound
                .to_http_response(format!("unknown agent: {agent_id}"))
                .into_response();
        }
    }

    let mut custom = req.custom;
    if let Some(provider_id) = req.provider_id {
        custom.insert("provider_id".to_owned(), serde_json::Value::String(provider_id));
    }

    let config = SessionConfig {
        provider_type: provider_type.clone(),
        kind,
        project_id: req.project_id,
        working_dir: req.working_dir,
        environment: req.environment,
        system_prompt: req.system_prompt,
        custom,
        task: TaskMeta { id: req.task_id, title: req.task_title },
        mcp_servers: req.mcp_servers,
    };

    match s.executor.start_session(None, config).await {
        Ok(record) => {
            (StatusCode::CREATED, Json(SessionResponse { session: record.status().await }))
                .into_response()
        }
        Err(MeshError::Internal) => {
            let message = match s.executor.cooldown_remaining(&provider_type) {
                Some(remaining) => format!(
                    "provider start suppressed, cooldown_remaining={}s",
                    remaining.as_secs().max(1)
                ),
                None => "adapter failed to start".to_owned(),
            };
            MeshError::Internal.to_http_response(message).into_response()
        }
        Err(e) => e.to_http_response(e.as_str().to_lowercase().replace('_', " ")).into_response(),
    }
}

/// `GET /api/sessions[?project_id=…]`
pub async fn list_sessions(
    State(s): State<Arc<MeshState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let sessions = s.executor.list_sessions(query.project_id.as_deref()).await;
    Json(SessionListResponse { sessions })
}

/// `GET /api/sessions/{id}` — status with metrics.
pub async fn get_session(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.get_session_status(&id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => e.to_http_response("session not found").into_response(),
    }
}

/// `DELETE /api/sessions/{id}` — stop; success when already gone.
pub async fn delete_session(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.stop_session(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.to_http_response("stop failed").into_response(),
    }
}

/// `POST /api/sessions/{id}/pause`
pub async fn pause_session(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.pause_session(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.to_http_response(pause_error_message(e)).into_response(),
    }
}

/// `POST /api/sessions/{id}/resume`
pub async fn resume_session(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.resume_session(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.to_http_response(pause_error_message(e)).into_response(),
    }
}

fn pause_error_message(e: MeshError) -> &'static str {
    match e {
        MeshError::SessionNotFound => "session not found",
        MeshError::InvalidState => "illegal lifecycle transition",
        _ => "lifecycle operation failed",
    }
}

/// `POST /api/sessions/{id}/input`
pub async fn send_input(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    Json(req): Json<InputRequest>,
) -> impl IntoResponse {
    if req.input.is_empty() {
        return MeshError::BadRequest.to_http_response("input must not be empty").into_response();
    }
    match s.executor.send_input(&id, &req.input).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.to_http_response("input delivery failed").into_response(),
    }
}

/// `POST /api/sessions/{id}/messages`
pub async fn send_message(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> impl IntoResponse {
    if req.content.is_empty() {
        return MeshError::BadRequest.to_http_response("content must not be empty").into_response();
    }
    match s.executor.send_message(&id, &req.content, req.provider_type.as_deref()).await {
        Ok(()) => Json(MessageAccepted { delivered: true }).into_response(),
        Err(MeshError::BadRequest) => MeshError::BadRequest
            .to_http_response("provider_type does not match this session")
            .into_response(),
        Err(e) => e.to_http_response("message delivery failed").into_response(),
    }
}

/// `GET /api/sessions/{id}/messages[?since=RFC3339]`
pub async fn list_messages(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    let since = match query.since.as_deref() {
        None => None,
        Some(raw) => match chrono::DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&chrono::Utc)),
            Err(_) => {
                return MeshError::BadRequest
                    .to_http_response("since must be an RFC 3339 timestamp")
                    .into_response()
            }
        },
    };
    match s.executor.get_session(&id).await {
        Ok(record) => {
            Json(MessagesResponse { messages: record.messages_since(since).await }).into_response()
        }
        Err(e) => e.to_http_response("session not found").into_response(),
    }
}

/// `GET /api/v1/terminals`
pub async fn list_terminals(State(s): State<Arc<MeshState>>) -> impl IntoResponse {
    Json(TerminalListResponse { terminals: s.executor.list_terminals().await })
}

/// `GET /api/v1/terminals/{id}`
pub async fn get_terminal(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.get_terminal(&id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.to_http_response("terminal not found").into_response(),
    }
}

/// `DELETE /api/v1/terminals/{id}`
pub async fn delete_terminal(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.delete_terminal(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.to_http_response("terminal not found").into_response(),
    }
}

/// `GET /api/v1/terminals/{id}/snapshot`
pub async fn terminal_snapshot(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.get_terminal(&id).await {
        Ok(record) => match record.last_snapshot {
            Some(snapshot) => Json(snapshot).into_response(),
            None => Json(TerminalSnapshot::blank(24, 80)).into_response(),
        },
        Err(e) => e.to_http_response("terminal not found").into_response(),
    }
}

/// `GET /api/v1/sessions/{id}/terminal/snapshot`
pub async fn session_terminal_snapshot(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.executor.terminal_snapshot(&id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => e.to_http_response("terminal unavailable").into_response(),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
