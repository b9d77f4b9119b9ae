// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios over the full stack: REST surface, broadcaster,
//! terminal hub, and dock bridge together.

use std::sync::Arc;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use orbitmesh::agent::{AdapterRegistry, AgentAdapter, MockAdapter};
use orbitmesh::config::Config;
use orbitmesh::terminal::TerminalUpdate;

use orbitmesh_specs::{create_session, spawn_http, spec_server, spec_state, SseClient};

/// S1 — create, list, stop; double stop stays a success.
#[tokio::test]
async fn s1_create_list_stop() -> anyhow::Result<()> {
    let state = spec_state()?;
    let server = spec_server(Arc::clone(&state))?;

    let id = create_session(
        &server,
        serde_json::json!({"provider_type": "mock", "working_dir": "/tmp/t"}),
    )
    .await?;
    assert!(!id.is_empty());

    let resp = server.get(&format!("/api/sessions/{id}")).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert!(body["state"] == "idle" || body["state"] == "running");

    let resp = server.get("/api/sessions").await;
    let body: serde_json::Value = resp.json();
    let listed = body["sessions"]
        .as_array()
        .is_some_and(|l| l.iter().any(|s| s["id"].as_str() == Some(id.as_str())));
    assert!(listed);

    let resp = server.delete(&format!("/api/sessions/{id}")).await;
    resp.assert_status(StatusCode::NO_CONTENT);
    let resp = server.delete(&format!("/api/sessions/{id}")).await;
    resp.assert_status(StatusCode::NO_CONTENT);
    Ok(())
}

/// S2 — the per-session SSE stream only carries its own session's events.
#[tokio::test]
async fn s2_session_event_isolation() -> anyhow::Result<()> {
    let state = spec_state()?;
    let server = spec_server(Arc::clone(&state))?;
    let addr = spawn_http(Arc::clone(&state)).await?;

    let a = create_session(&server, serde_json::json!({"provider_type": "mock"})).await?;
    let b = create_session(&server, serde_json::json!({"provider_type": "mock"})).await?;

    // The subscription is live once the response headers arrive.
    let mut sse = SseClient::connect(addr, &format!("/api/sessions/{a}/events"), None).await?;

    // Output on B first, then on A.
    let resp = server
        .post(&format!("/api/sessions/{b}/input"))
        .json(&serde_json::json!({"input": "noise"}))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);
    let resp = server
        .post(&format!("/api/sessions/{a}/input"))
        .json(&serde_json::json!({"input": "hello"}))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    // The first frame on A's stream is A's output; B's never shows up.
    let frame = sse.next_frame().await?;
    assert_eq!(frame.event.as_deref(), Some("output"));
    assert!(frame.id.as_deref().is_some_and(|id| id.parse::<u64>().is_ok()));
    let payload = frame.json()?;
    assert_eq!(payload["session_id"], a.as_str());
    assert_eq!(payload["content"], "hello");
    Ok(())
}

/// S3 — reconnecting with `Last-Event-ID` resumes exactly after the last
/// seen frame.
#[tokio::test]
async fn s3_replay_after_disconnect() -> anyhow::Result<()> {
    let state = spec_state()?;
    let server = spec_server(Arc::clone(&state))?;
    let addr = spawn_http(Arc::clone(&state)).await?;
    let a = create_session(&server, serde_json::json!({"provider_type": "mock"})).await?;
    let path = format!("/api/sessions/{a}/events");

    let mut sse = SseClient::connect(addr, &path, None).await?;
    let resp = server
        .post(&format!("/api/sessions/{a}/input"))
        .json(&serde_json::json!({"input": "first"}))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let first = sse.next_frame().await?;
    assert_eq!(first.event.as_deref(), Some("output"));
    assert_eq!(first.json()?["content"], "first");
    let v1 = first.id.ok_or_else(|| anyhow::anyhow!("frame without an id"))?;
    // Disconnect.
    drop(sse);

    let resp = server
        .post(&format!("/api/sessions/{a}/input"))
        .json(&serde_json::json!({"input": "second"}))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    // Reconnect with Last-Event-ID = v1: the stream resumes with the event
    // published while disconnected, exactly once.
    let mut sse = SseClient::connect(addr, &path, Some(&v1)).await?;
    let frame = sse.next_frame().await?;
    assert_eq!(frame.event.as_deref(), Some("output"));
    assert_eq!(frame.json()?["content"], "second");
    assert_ne!(frame.id.as_deref(), Some(v1.as_str()));
    Ok(())
}

/// The global SSE stream carries StatusChange events only.
#[tokio::test]
async fn global_events_stream_is_state_only() -> anyhow::Result<()> {
    let state = spec_state()?;
    let server = spec_server(Arc::clone(&state))?;
    let addr = spawn_http(Arc::clone(&state)).await?;

    let mut sse = SseClient::connect(addr, "/api/sessions/events", None).await?;
    let id = create_session(&server, serde_json::json!({"provider_type": "mock"})).await?;

    // created -> starting -> running.
    let frame = sse.next_frame().await?;
    assert_eq!(frame.event.as_deref(), Some("status_change"));
    assert_eq!(frame.json()?["new"], "starting");
    let frame = sse.next_frame().await?;
    assert_eq!(frame.event.as_deref(), Some("status_change"));
    let payload = frame.json()?;
    assert_eq!(payload["new"], "running");
    assert_eq!(payload["session_id"], id.as_str());

    // An output event stays session-scoped; the next global frame is the
    // pause transition.
    let resp = server
        .post(&format!("/api/sessions/{id}/input"))
        .json(&serde_json::json!({"input": "hello"}))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);
    let resp = server.post(&format!("/api/sessions/{id}/pause")).await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let frame = sse.next_frame().await?;
    assert_eq!(frame.event.as_deref(), Some("status_change"));
    assert_eq!(frame.json()?["new"], "paused");
    Ok(())
}

/// S4 — dock request/response round-trip, and timeout without a responder.
#[tokio::test]
async fn s4_dock_round_trip() -> anyhow::Result<()> {
    // Short dock timeout so the no-responder half stays fast.
    let config = Config::for_tests().with_dock_timeout(1);
    let state = orbitmesh::build_state(
        config,
        AdapterRegistry::with_builtin(),
        CancellationToken::new(),
    )?;
    let server = spec_server(Arc::clone(&state))?;

    let id = create_session(
        &server,
        serde_json::json!({"provider_type": "mock", "session_kind": "dock"}),
    )
    .await?;

    let (request_resp, _) = tokio::join!(
        server
            .post(&format!("/api/sessions/{id}/dock/mcp/request"))
            .json(&serde_json::json!({"kind": "list", "payload": {}})),
        async {
            let next = server.get(&format!("/api/sessions/{id}/dock/mcp/next?timeout_ms=5000")).await;
            next.assert_status_ok();
            let request: serde_json::Value = next.json();
            let request_id = request["id"].as_str().unwrap_or_default().to_owned();
            assert!(!request_id.is_empty(), "next must carry a server-assigned id");

            let resp = server
                .post(&format!("/api/sessions/{id}/dock/mcp/respond"))
                .json(&serde_json::json!({"id": request_id, "result": {"ok": true}}))
                .await;
            resp.assert_status(StatusCode::NO_CONTENT);
        }
    );
    request_resp.assert_status_ok();
    let body: serde_json::Value = request_resp.json();
    assert_eq!(body["result"]["ok"], true);

    // Without a responder the request times out.
    let resp = server
        .post(&format!("/api/sessions/{id}/dock/mcp/request"))
        .json(&serde_json::json!({"kind": "dispatch", "payload": {}}))
        .await;
    resp.assert_status(StatusCode::GATEWAY_TIMEOUT);
    Ok(())
}

/// S5 — a late terminal subscriber is primed with the current snapshot and
/// then receives live diffs in seq order.
#[tokio::test]
async fn s5_terminal_late_join() -> anyhow::Result<()> {
    let state = spec_state()?;
    let server = spec_server(Arc::clone(&state))?;
    let id = create_session(&server, serde_json::json!({"provider_type": "mock"})).await?;

    let hub = state.executor.terminal_hub(&id).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    hub.publish(TerminalUpdate::Snapshot {
        seq: 0,
        rows: 2,
        cols: 2,
        lines: vec!["hi".into(), String::new()],
    });

    let mut updates = hub.subscribe(16);
    match updates.recv().await {
        Some(TerminalUpdate::Snapshot { rows, cols, lines, .. }) => {
            assert_eq!((rows, cols), (2, 2));
            assert_eq!(lines, vec!["hi".to_owned(), String::new()]);
        }
        other => anyhow::bail!("first frame must be a snapshot, got {other:?}"),
    }

    hub.publish(TerminalUpdate::Diff {
        seq: 0,
        x0: 0,
        y0: 0,
        x1: 10,
        y1: 1,
        lines: vec!["world".into()],
    });
    match updates.recv().await {
        Some(TerminalUpdate::Diff { seq, .. }) => assert_eq!(seq, 2),
        other => anyhow::bail!("expected diff, got {other:?}"),
    }
    Ok(())
}

/// S6 — input sent while paused is delivered on resume, in order, exactly
/// once.
#[tokio::test]
async fn s6_pause_resume_input_buffering() -> anyhow::Result<()> {
    // Capture the adapters the registry builds so delivery can be asserted.
    let adapters: Arc<std::sync::Mutex<Vec<Arc<MockAdapter>>>> = Arc::default();
    let mut registry = AdapterRegistry::new();
    {
        let adapters = Arc::clone(&adapters);
        registry.register("mock", move |id, _config| {
            let adapter = Arc::new(MockAdapter::new(id));
            locked(&adapters).push(Arc::clone(&adapter));
            adapter as Arc<dyn AgentAdapter>
        });
    }
    let state = orbitmesh::build_state(
        Config::for_tests(),
        registry,
        CancellationToken::new(),
    )?;
    let server = spec_server(Arc::clone(&state))?;
    let id = create_session(&server, serde_json::json!({"provider_type": "mock"})).await?;
    let adapter = Arc::clone(&locked(&adapters)[0]);

    let resp = server.post(&format!("/api/sessions/{id}/pause")).await;
    resp.assert_status(StatusCode::NO_CONTENT);

    for i in 1..=5 {
        let resp = server
            .post(&format!("/api/sessions/{id}/input"))
            .json(&serde_json::json!({"input": format!("cmd-{i}")}))
            .await;
        resp.assert_status(StatusCode::NO_CONTENT);
    }
    assert!(adapter.inputs().is_empty(), "paused input must not reach the adapter");

    let resp = server.post(&format!("/api/sessions/{id}/resume")).await;
    resp.assert_status(StatusCode::NO_CONTENT);

    assert_eq!(adapter.inputs(), vec!["cmd-1", "cmd-2", "cmd-3", "cmd-4", "cmd-5"]);
    Ok(())
}

/// Lock a mutex, recovering from poisoning (fine in tests).
fn locked<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
