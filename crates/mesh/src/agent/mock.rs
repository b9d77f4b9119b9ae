// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process mock adapter.
//!
//! Deterministic stand-in for a subprocess agent: echoes input as output
//! events, exposes a scriptable terminal surface, and captures everything it
//! is told so tests can assert on delivery order.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::{AgentEvent, EventPayload};
use crate::session::SessionMetrics;
use crate::terminal::{TerminalInput, TerminalSnapshot, TerminalUpdate};

use super::{AdapterState, AdapterStatus, AgentAdapter, Snapshottable, TerminalSurface};

/// Event channel capacity; large enough that scripted emissions never block.
const EVENT_BUFFER: usize = 64;

/// Scriptable in-process adapter registered as provider type `mock`.
pub struct MockAdapter {
    session_id: String,
    state: Mutex<AdapterState>,
    event_tx: Mutex<Option<mpsc::Sender<AgentEvent>>>,
    inputs: Mutex<Vec<String>>,
    metrics: Mutex<SessionMetrics>,
    script: Vec<EventPayload>,
    fail_start: bool,
    echo: bool,
    terminal: Option<MockTerminal>,
    provider_state: Mutex<HashMap<String, serde_json::Value>>,
}

impl MockAdapter {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: Mutex::new(AdapterState::Created),
            event_tx: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
            metrics: Mutex::new(SessionMetrics::default()),
            script: Vec::new(),
            fail_start: false,
            echo: true,
            terminal: None,
            provider_state: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a terminal surface (makes the adapter terminal-capable).
    pub fn with_terminal(mut self) -> Self {
        self.terminal = Some(MockTerminal::new());
        self
    }

    /// Emit these events right after `start` succeeds.
    pub fn with_script(mut self, script: Vec<EventPayload>) -> Self {
        self.script = script;
        self
    }

    /// Make `start` fail (for breaker and error-path tests).
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Disable echoing inputs back as output events.
    pub fn silent(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Inputs observed so far, in delivery order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }

    /// Simulate a crash: the events channel closes without a stop.
    pub fn crash(&self) {
        self.event_tx.lock().take();
    }

    /// Push a terminal update as if the PTY produced it.
    ///
    /// Returns false when the adapter has no terminal surface.
    pub fn push_terminal_update(&self, update: TerminalUpdate) -> bool {
        match &self.terminal {
            Some(term) => {
                term.push_update(update);
                true
            }
            None => false,
        }
    }

    /// Terminal inputs observed by the surface, in delivery order.
    pub fn terminal_inputs(&self) -> Vec<TerminalInput> {
        self.terminal.as_ref().map(|t| t.inputs.lock().clone()).unwrap_or_default()
    }

    fn emit(&self, payload: EventPayload) {
        if let Some(tx) = self.event_tx.lock().as_ref() {
            let _ = tx.try_send(AgentEvent::now(&self.session_id, payload));
        }
    }
}

#[async_trait]
impl AgentAdapter for MockAdapter {
    async fn start(&self) -> anyhow::Result<mpsc::Receiver<AgentEvent>> {
        if self.fail_start {
            anyhow::bail!("mock adapter configured to fail start");
        }
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        *self.event_tx.lock() = Some(tx);
        *self.state.lock() = AdapterState::Running;
        for payload in &self.script {
            self.emit(payload.clone());
        }
        Ok(rx)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        *self.state.lock() = AdapterState::Stopped;
        self.event_tx.lock().take();
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        *self.state.lock() = AdapterState::Paused;
        Ok(())
    }

    async fn resume(&self) -> anyhow::Result<()> {
        *self.state.lock() = AdapterState::Running;
        Ok(())
    }

    fn kill(&self) {
        *self.state.lock() = AdapterState::Stopped;
        self.event_tx.lock().take();
    }

    fn status(&self) -> AdapterStatus {
        AdapterStatus { state: *self.state.lock(), metrics: self.metrics.lock().clone() }
    }

    async fn send_input(&self, text: &str) -> anyhow::Result<()> {
        self.inputs.lock().push(text.to_owned());
        {
            let mut metrics = self.metrics.lock();
            metrics.request_count += 1;
            metrics.tokens_in += text.len() as u64;
            metrics.last_activity_at = Some(chrono::Utc::now());
        }
        self.provider_state
            .lock()
            .insert("input_count".to_owned(), serde_json::json!(self.inputs.lock().len()));
        if self.echo {
            self.emit(EventPayload::Output { content: text.to_owned() });
        }
        Ok(())
    }

    fn terminal(&self) -> Option<&dyn TerminalSurface> {
        self.terminal.as_ref().map(|t| t as &dyn TerminalSurface)
    }

    fn snapshots(&self) -> Option<&dyn Snapshottable> {
        Some(self)
    }
}

impl Snapshottable for MockAdapter {
    fn create_snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.provider_state.lock().clone()
    }

    fn restore_from_snapshot(
        &self,
        state: &HashMap<String, serde_json::Value>,
    ) -> anyhow::Result<()> {
        *self.provider_state.lock() = state.clone();
        Ok(())
    }
}

/// Terminal surface backed by plain vectors.
struct MockTerminal {
    snapshot: Mutex<TerminalSnapshot>,
    subscribers: Mutex<Vec<mpsc::Sender<TerminalUpdate>>>,
    inputs: Mutex<Vec<TerminalInput>>,
}

impl MockTerminal {
    fn new() -> Self {
        Self {
            snapshot: Mutex::new(TerminalSnapshot::blank(24, 80)),
            subscribers: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    fn push_update(&self, update: TerminalUpdate) {
        if let TerminalUpdate::Snapshot { rows, cols, lines, .. } = &update {
            *self.snapshot.lock() =
                TerminalSnapshot { rows: *rows, cols: *cols, lines: lines.clone() };
        }
        self.subscribers.lock().retain(|tx| tx.try_send(update.clone()).is_ok());
    }
}

#[async_trait]
impl TerminalSurface for MockTerminal {
    fn snapshot(&self) -> TerminalSnapshot {
        self.snapshot.lock().clone()
    }

    fn subscribe_updates(&self, buffer: usize) -> mpsc::Receiver<TerminalUpdate> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    async fn handle_input(&self, input: TerminalInput) -> anyhow::Result<()> {
        if let TerminalInput::Resize { cols, rows } = input {
            let mut snapshot = self.snapshot.lock();
            snapshot.cols = cols;
            snapshot.rows = rows;
            snapshot.lines.resize(rows as usize, String::new());
        }
        self.inputs.lock().push(input);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
