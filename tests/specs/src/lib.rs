// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the end-to-end spec suite.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use orbitmesh::agent::AdapterRegistry;
use orbitmesh::config::Config;
use orbitmesh::state::MeshState;
use orbitmesh::transport::build_router;

/// Full service state with the built-in mock provider and CSRF disabled.
pub fn spec_state() -> anyhow::Result<Arc<MeshState>> {
    orbitmesh::build_state(
        Config::for_tests(),
        AdapterRegistry::with_builtin(),
        CancellationToken::new(),
    )
}

/// In-process server over the full router.
pub fn spec_server(state: Arc<MeshState>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(state)).map_err(|e| anyhow::anyhow!("{e}"))
}

/// Create a mock session and return its id.
pub async fn create_session(
    server: &TestServer,
    body: serde_json::Value,
) -> anyhow::Result<String> {
    let resp = server.post("/api/sessions").json(&body).await;
    resp.assert_status(axum::http::StatusCode::CREATED);
    let json: serde_json::Value = resp.json();
    json["id"].as_str().map(String::from).ok_or_else(|| anyhow::anyhow!("missing id: {json}"))
}

/// Serve the full router on an ephemeral local port, for tests that need a
/// genuine streaming connection rather than a collected response body.
pub async fn spawn_http(state: Arc<MeshState>) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

/// One parsed SSE frame.
#[derive(Debug, Clone, Default)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn json(&self) -> anyhow::Result<serde_json::Value> {
        serde_json::from_str(&self.data).map_err(|e| anyhow::anyhow!("bad frame data: {e}"))
    }
}

/// Minimal SSE reader over a raw HTTP/1.0 connection.
///
/// HTTP/1.0 keeps the body close-delimited, so frames arrive as plain
/// `id:`/`event:`/`data:` lines without chunked-transfer framing in between.
pub struct SseClient {
    reader: BufReader<TcpStream>,
}

impl SseClient {
    /// Open the stream and consume the response headers.
    pub async fn connect(
        addr: SocketAddr,
        path: &str,
        last_event_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let mut request =
            format!("GET {path} HTTP/1.0\r\nHost: localhost\r\nAccept: text/event-stream\r\n");
        if let Some(id) = last_event_id {
            request.push_str(&format!("Last-Event-ID: {id}\r\n"));
        }
        request.push_str("\r\n");
        stream.write_all(request.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        let mut status = String::new();
        reader.read_line(&mut status).await?;
        anyhow::ensure!(status.contains("200"), "unexpected status line: {status:?}");
        let mut saw_event_stream = false;
        loop {
            let mut line = String::new();
            anyhow::ensure!(reader.read_line(&mut line).await? > 0, "headers cut short");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if line.to_ascii_lowercase().contains("text/event-stream") {
                saw_event_stream = true;
            }
        }
        anyhow::ensure!(saw_event_stream, "response is not an event stream");
        Ok(Self { reader })
    }

    /// Read the next non-heartbeat frame, bounded by a five second timeout.
    pub async fn next_frame(&mut self) -> anyhow::Result<SseFrame> {
        tokio::time::timeout(Duration::from_secs(5), self.read_frame())
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for an SSE frame"))?
    }

    async fn read_frame(&mut self) -> anyhow::Result<SseFrame> {
        loop {
            let mut frame = SseFrame::default();
            let mut saw_field = false;
            loop {
                let mut line = String::new();
                anyhow::ensure!(self.reader.read_line(&mut line).await? > 0, "stream closed");
                let line = line.trim_end();
                if line.is_empty() {
                    if saw_field {
                        break;
                    }
                    continue;
                }
                saw_field = true;
                if let Some(value) = line.strip_prefix("id:") {
                    frame.id = Some(value.trim().to_owned());
                } else if let Some(value) = line.strip_prefix("event:") {
                    frame.event = Some(value.trim().to_owned());
                } else if let Some(value) = line.strip_prefix("data:") {
                    if !frame.data.is_empty() {
                        frame.data.push('\n');
                    }
                    frame.data.push_str(value.trim_start());
                }
            }
            if frame.event.as_deref() == Some("heartbeat") {
                continue;
            }
            return Ok(frame);
        }
    }
}
