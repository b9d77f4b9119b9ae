// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal WebSocket: primes with a snapshot, then streams hub updates;
//! input flows back when the client opted into `write=true` and passed the
//! CSRF double-submit (header or `csrf_token` query, since browsers cannot
//! set custom headers on WebSocket upgrades).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::MeshError;
use crate::state::MeshState;
use crate::terminal::{TerminalHub, TerminalInput, TerminalUpdate};

use super::csrf;

#[derive(Debug, Deserialize)]
pub struct TerminalWsQuery {
    #[serde(default)]
    pub write: Option<bool>,
    #[serde(default)]
    pub allow_raw: Option<bool>,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// `GET /api/sessions/{id}/terminal/ws`
pub async fn terminal_ws_handler(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    Query(query): Query<TerminalWsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = match s.executor.terminal_hub(&id).await {
        Ok(hub) => hub,
        Err(e) => return e.to_http_response("terminal unavailable").into_response(),
    };

    let write = query.write.unwrap_or(false);
    if write && !s.config.csrf_disabled {
        if let Err(code) =
            csrf::validate_double_submit(&headers, query.csrf_token.as_deref())
        {
            return code.to_http_response("csrf token required for write access").into_response();
        }
    }
    let allow_raw = query.allow_raw.unwrap_or(false);
    let buffer = s.config.subscriber_buffer;

    ws.on_upgrade(move |socket| handle_connection(hub, socket, write, allow_raw, buffer))
        .into_response()
}

/// Per-connection loop: hub updates out, terminal input in.
async fn handle_connection(
    hub: Arc<TerminalHub>,
    socket: WebSocket,
    write: bool,
    allow_raw: bool,
    buffer: usize,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    // Subscribe primes the queue with a coherent snapshot before any live
    // update, so the first frame the client sees is a full screen.
    let mut updates = hub.subscribe(buffer);

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                if send_json(&mut ws_tx, &update).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match msg {
                    Message::Text(text) => {
                        let error = handle_input_frame(&hub, &text, write, allow_raw).await;
                        if let Some(message) = error {
                            let frame = TerminalUpdate::Error {
                                seq: hub.next_seq(),
                                message,
                                resync: false,
                            };
                            if send_json(&mut ws_tx, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
}

/// Parse and deliver one input frame; returns an error message for the
/// client when delivery is refused.
async fn handle_input_frame(
    hub: &TerminalHub,
    text: &str,
    write: bool,
    allow_raw: bool,
) -> Option<String> {
    if !write {
        return Some("connection is read-only".to_owned());
    }
    let input: TerminalInput = match serde_json::from_str(text) {
        Ok(input) => input,
        Err(_) => return Some("invalid terminal input frame".to_owned()),
    };
    match hub.handle_input(input, allow_raw).await {
        Ok(()) => None,
        Err(MeshError::Forbidden) => Some("raw input not allowed on this connection".to_owned()),
        Err(e) => Some(format!("input rejected: {e}")),
    }
}

/// Send a JSON-serialized frame over the WebSocket.
async fn send_json<S, T>(tx: &mut S, frame: &T) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
    T: serde::Serialize,
{
    let text = match serde_json::to_string(frame) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}
