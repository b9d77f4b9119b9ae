// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-Sent Events streams: per-session events and the global
//! StatusChange feed.
//!
//! Frames carry the broadcaster seq as the SSE `id:` so clients reconnect
//! with `Last-Event-ID` (or a `last_event_id` query parameter) and resume
//! exactly after the last event they saw. Replay past the retained window
//! emits a `replay_gap` frame first so clients refetch state instead of
//! trusting a truncated prefix.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};

use crate::broadcast::EventFilter;
use crate::event::{AgentEvent, EventPayload};
use crate::state::MeshState;

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    #[serde(default)]
    pub last_event_id: Option<String>,
}

/// `GET /api/sessions/{id}/events`
pub async fn session_events(
    State(s): State<Arc<MeshState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> impl IntoResponse {
    if s.executor.get_session(&id).await.is_err() {
        return crate::error::MeshError::SessionNotFound
            .to_http_response("session not found")
            .into_response();
    }
    event_stream_response(&s, EventFilter::Session(id), &headers, &query)
}

/// `GET /api/sessions/events` — StatusChange events of all sessions.
pub async fn global_events(
    State(s): State<Arc<MeshState>>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> impl IntoResponse {
    event_stream_response(&s, EventFilter::SessionsState, &headers, &query)
}

/// Assemble replay + live + heartbeat into one SSE response.
fn event_stream_response(
    s: &Arc<MeshState>,
    filter: EventFilter,
    headers: &HeaderMap,
    query: &SseQuery,
) -> axum::response::Response {
    let last_seen = last_event_id(headers, query);
    let subscription =
        s.executor.broadcaster().subscribe(filter.clone(), s.config.subscriber_buffer);

    let mut head = Vec::new();
    if let Some(last_seen) = last_seen {
        let replay = s.executor.broadcaster().replay_from(
            &filter,
            last_seen,
            Some(subscription.since_seq),
        );
        if replay.gap {
            head.push(
                Event::default()
                    .event("replay_gap")
                    .data(r#"{"reason":"events expired from the replay window"}"#),
            );
        }
        let sanitizer = &s.sanitizer;
        head.extend(replay.events.into_iter().map(|e| event_frame(sanitize(sanitizer, e))));
    }

    let state = Arc::clone(s);
    let live = ReceiverStream::new(subscription.rx)
        .map(move |event| event_frame(sanitize(&state.sanitizer, event)));

    let mut ticker = tokio::time::interval(s.config.heartbeat());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.reset();
    let heartbeats =
        IntervalStream::new(ticker).map(|_| Event::default().event("heartbeat").data("{}"));

    let frames: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(
        stream::select(stream::iter(head).chain(live), heartbeats).map(Ok),
    );

    let mut response = Sse::new(frames).into_response();
    response
        .headers_mut()
        .insert(axum::http::header::CACHE_CONTROL, axum::http::HeaderValue::from_static("no-cache"));
    response
}

/// Resolve the client's resume position from header or query.
fn last_event_id(headers: &HeaderMap, query: &SseQuery) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .or(query.last_event_id.as_deref())
        .and_then(|raw| raw.trim().parse().ok())
}

/// Build the SSE frame for one event: `id` = seq, `event` = payload tag.
fn event_frame(event: AgentEvent) -> Event {
    let frame = Event::default().id(event.seq.to_string()).event(event.kind());
    match serde_json::to_string(&event) {
        Ok(json) => frame.data(json),
        Err(_) => frame.data("{}"),
    }
}

/// Guardrail pass for untrusted text in metadata values.
fn sanitize(sanitizer: &crate::sanitize::Sanitizer, mut event: AgentEvent) -> AgentEvent {
    if let EventPayload::Metadata { ref mut value, .. } = event.payload {
        if let serde_json::Value::String(ref text) = value {
            *value = serde_json::Value::String(sanitizer.clean(text));
        }
    }
    event
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
