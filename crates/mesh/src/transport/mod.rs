// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router assembly for the REST + streaming API.

pub mod csrf;
pub mod dock;
pub mod http;
pub mod realtime_ws;
pub mod sse;
pub mod terminal_ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::MeshState;

/// Build the axum `Router` with all HTTP, SSE, and WebSocket routes.
pub fn build_router(state: Arc<MeshState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/sessions", post(http::create_session).get(http::list_sessions))
        .route("/api/sessions/events", get(sse::global_events))
        .route("/api/sessions/{id}", get(http::get_session).delete(http::delete_session))
        .route("/api/sessions/{id}/pause", post(http::pause_session))
        .route("/api/sessions/{id}/resume", post(http::resume_session))
        .route("/api/sessions/{id}/input", post(http::send_input))
        .route(
            "/api/sessions/{id}/messages",
            post(http::send_message).get(http::list_messages),
        )
        .route("/api/sessions/{id}/events", get(sse::session_events))
        .route("/api/sessions/{id}/terminal/ws", get(terminal_ws::terminal_ws_handler))
        .route("/api/sessions/{id}/dock/mcp/next", get(dock::next_request))
        .route("/api/sessions/{id}/dock/mcp/request", post(dock::enqueue_request))
        .route("/api/sessions/{id}/dock/mcp/respond", post(dock::respond))
        .route("/api/v1/terminals", get(http::list_terminals))
        .route(
            "/api/v1/terminals/{id}",
            get(http::get_terminal).delete(http::delete_terminal),
        )
        .route("/api/v1/terminals/{id}/snapshot", get(http::terminal_snapshot))
        .route(
            "/api/v1/sessions/{id}/terminal/snapshot",
            get(http::session_terminal_snapshot),
        )
        .route("/api/realtime", get(realtime_ws::realtime_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), csrf::csrf_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
