// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-topic realtime WebSocket.
//!
//! Each subscribed topic gets a `snapshot` frame first, then a forwarder
//! task feeds `event` frames through a bounded per-connection queue. A slow
//! client drops frames rather than stalling the hubs behind it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broadcast::EventFilter;
use crate::realtime::{ClientFrame, ServerFrame, Topic};
use crate::state::MeshState;

/// Per-connection outbound queue capacity.
const OUT_BUFFER: usize = 256;

/// `GET /api/realtime`
pub async fn realtime_handler(
    State(s): State<Arc<MeshState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(s, socket))
}

async fn handle_connection(state: Arc<MeshState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(OUT_BUFFER);
    let mut forwarders: HashMap<String, CancellationToken> = HashMap::new();

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                if send_json(&mut ws_tx, &frame).await.is_err() {
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
                        let frame: ClientFrame = match serde_json::from_str(&text) {
                            Ok(f) => f,
                            Err(_) => {
                                let err = ServerFrame::error(None, "invalid frame");
                                if send_json(&mut ws_tx, &err).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        handle_client_frame(&state, frame, &out_tx, &mut forwarders).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    for (_, cancel) in forwarders {
        cancel.cancel();
    }
}

async fn handle_client_frame(
    state: &Arc<MeshState>,
    frame: ClientFrame,
    out_tx: &mpsc::Sender<ServerFrame>,
    forwarders: &mut HashMap<String, CancellationToken>,
) {
    match frame {
        ClientFrame::Ping {} => {
            let _ = out_tx.try_send(ServerFrame::Pong {});
        }
        ClientFrame::Unsubscribe { topics } => {
            for name in topics {
                if let Some(cancel) = forwarders.remove(&name) {
                    cancel.cancel();
                }
            }
        }
        ClientFrame::Subscribe { topics } => {
            for name in topics {
                if forwarders.contains_key(&name) {
                    continue;
                }
                let Some(topic) = Topic::parse(&name) else {
                    let _ = out_tx.try_send(ServerFrame::error(
                        Some(name.clone()),
                        "unknown topic",
                    ));
                    continue;
                };
                match subscribe_topic(state, &topic, out_tx).await {
                    Ok(cancel) => {
                        forwarders.insert(name, cancel);
                    }
                    Err(message) => {
                        let _ = out_tx.try_send(ServerFrame::error(Some(name.clone()), message));
                    }
                }
            }
        }
    }
}

/// Send the topic's snapshot and spawn its event forwarder.
async fn subscribe_topic(
    state: &Arc<MeshState>,
    topic: &Topic,
    out_tx: &mpsc::Sender<ServerFrame>,
) -> Result<CancellationToken, String> {
    let cancel = CancellationToken::new();
    let name = topic.name();

    match topic {
        Topic::SessionsState => {
            let sessions = state.executor.list_sessions(None).await;
            push_snapshot(out_tx, &name, serde_json::to_value(sessions));

            let mut sub = state
                .executor
                .broadcaster()
                .subscribe(EventFilter::SessionsState, state.config.subscriber_buffer);
            let tx = out_tx.clone();
            spawn_forwarder(cancel.clone(), async move {
                while let Some(event) = sub.rx.recv().await {
                    push_event(&tx, &name, serde_json::to_value(event));
                }
            });
        }
        Topic::SessionActivity(id) => {
            let status = state
                .executor
                .get_session_status(id)
                .await
                .map_err(|_| "session not found".to_owned())?;
            push_snapshot(out_tx, &name, serde_json::to_value(status));

            let mut sub = state
                .executor
                .broadcaster()
                .subscribe(EventFilter::Session(id.clone()), state.config.subscriber_buffer);
            let tx = out_tx.clone();
            spawn_forwarder(cancel.clone(), async move {
                while let Some(event) = sub.rx.recv().await {
                    push_event(&tx, &name, serde_json::to_value(event));
                }
            });
        }
        Topic::TerminalsState => {
            let terminals = state.executor.list_terminals().await;
            push_snapshot(out_tx, &name, serde_json::to_value(terminals));

            // Terminals appear and disappear with their sessions, so session
            // state changes drive inventory refreshes.
            let executor = Arc::clone(&state.executor);
            let mut sub = state
                .executor
                .broadcaster()
                .subscribe(EventFilter::SessionsState, state.config.subscriber_buffer);
            let tx = out_tx.clone();
            spawn_forwarder(cancel.clone(), async move {
                while sub.rx.recv().await.is_some() {
                    let terminals = executor.list_terminals().await;
                    push_event(&tx, &name, serde_json::to_value(terminals));
                }
            });
        }
        Topic::TerminalOutput(id) => {
            let hub = state
                .executor
                .terminal_hub(id)
                .await
                .map_err(|_| "terminal not found".to_owned())?;
            // The hub's prime doubles as the snapshot frame; later updates
            // stream as events.
            let mut updates = hub.subscribe(state.config.subscriber_buffer);
            let prime = updates.recv().await.ok_or_else(|| "terminal closed".to_owned())?;
            push_snapshot(out_tx, &name, serde_json::to_value(prime));

            let tx = out_tx.clone();
            spawn_forwarder(cancel.clone(), async move {
                while let Some(update) = updates.recv().await {
                    push_event(&tx, &name, serde_json::to_value(update));
                }
            });
        }
    }
    Ok(cancel)
}

/// Run a forwarder future until it ends or the topic is unsubscribed.
fn spawn_forwarder<Fut>(cancel: CancellationToken, forward: Fut)
where
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = forward => {}
            _ = cancel.cancelled() => {}
        }
    });
}

fn push_snapshot(
    out_tx: &mpsc::Sender<ServerFrame>,
    topic: &str,
    payload: Result<serde_json::Value, serde_json::Error>,
) {
    if let Ok(payload) = payload {
        let _ = out_tx.try_send(ServerFrame::Snapshot { topic: topic.to_owned(), payload });
    }
}

fn push_event(
    out_tx: &mpsc::Sender<ServerFrame>,
    topic: &str,
    payload: Result<serde_json::Value, serde_json::Error>,
) {
    if let Ok(payload) = payload {
        let _ = out_tx.try_send(ServerFrame::Event { topic: topic.to_owned(), payload });
    }
}

/// Send a JSON-serialized frame over the WebSocket.
async fn send_json<S>(tx: &mut S, frame: &ServerFrame) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(frame) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}
