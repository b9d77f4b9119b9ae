// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session aggregate: configuration, lifecycle phases, metrics, and the
//! in-memory record owned by the executor registry.

pub mod executor;
pub mod pump;

pub use executor::SessionExecutor;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentAdapter;
use crate::broadcast::EventBroadcaster;
use crate::dock::DockBridge;
use crate::error::MeshError;
use crate::event::{AgentEvent, EventPayload};
use crate::ring::OutputRing;

/// Bytes of recent output retained per session.
pub const OUTPUT_RING_CAPACITY: usize = 4096;

/// Internal lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Created,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Three-state projection shown to clients.
    pub fn external(&self) -> SessionState {
        match self {
            Self::Created | Self::Stopped | Self::Error => SessionState::Idle,
            Self::Starting | Self::Running => SessionState::Running,
            Self::Paused | Self::Stopping => SessionState::Suspended,
        }
    }

    /// Whether the state machine permits moving to `next`.
    ///
    /// `Running → Starting` is the crash-restart edge used only by the
    /// executor's event pump.
    pub fn can_transition(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Created, Stopping)
                | (Starting, Running)
                | (Starting, Error)
                | (Starting, Stopping)
                | (Running, Paused)
                | (Running, Stopping)
                | (Running, Starting)
                | (Running, Error)
                | (Paused, Running)
                | (Paused, Stopping)
                | (Stopping, Stopped)
                | (Error, Stopping)
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External three-state model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Suspended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Suspended => "suspended",
        }
    }
}

impl SessionKind {
    pub fn is_dock(&self) -> bool {
        matches!(self, Self::Dock)
    }
}

/// Whether a session serves an interactive agent or a dock MCP worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Interactive,
    Dock,
}

/// One MCP server the session should expose to its agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Task metadata attached at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Immutable configuration captured when a session is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub provider_type: String,
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub task: TaskMeta,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

impl SessionConfig {
    pub fn new(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            kind: SessionKind::default(),
            project_id: None,
            working_dir: None,
            environment: HashMap::new(),
            system_prompt: None,
            custom: HashMap::new(),
            task: TaskMeta::default(),
            mcp_servers: Vec::new(),
        }
    }
}

/// Usage counters mirrored from the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionMetrics {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub request_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Most recent non-fatal error reported by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLastError {
    pub message: String,
    pub code: String,
}

/// One entry of the append-only message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: String,
    pub content: String,
    pub ts: DateTime<Utc>,
}

/// Point-in-time view of a session returned by status and list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: String,
    pub provider_type: String,
    pub kind: SessionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub state: SessionState,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
    pub last_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<SessionLastError>,
}

/// Capacity of the paused-input buffer.
pub const INPUT_BUFFER_CAPACITY: usize = 10;

/// Mutable state guarded by the record's own mutex.
pub(crate) struct SessionBody {
    pub phase: SessionPhase,
    pub updated_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
    pub output: OutputRing,
    pub last_error: Option<SessionLastError>,
    pub history: Vec<MessageRecord>,
    pub buffered_input: VecDeque<String>,
    pub restarts: VecDeque<Instant>,
    pub stop_requested: bool,
}

/// In-memory session aggregate. One adapter instance per record.
pub struct SessionRecord {
    pub id: String,
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
    pub adapter: Arc<dyn AgentAdapter>,
    pub cancel: CancellationToken,
    /// Present only for `SessionKind::Dock`.
    pub dock: Option<Arc<DockBridge>>,
    broadcaster: Arc<EventBroadcaster>,
    pub(crate) body: Mutex<SessionBody>,
    /// Pump/ticker tasks owned by this record; awaited on stop.
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionRecord {
    pub fn new(
        id: impl Into<String>,
        config: SessionConfig,
        adapter: Arc<dyn AgentAdapter>,
        broadcaster: Arc<EventBroadcaster>,
        dock: Option<Arc<DockBridge>>,
    ) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            id: id.into(),
            config,
            created_at: now,
            adapter,
            cancel: CancellationToken::new(),
            dock,
            broadcaster,
            body: Mutex::new(SessionBody {
                phase: SessionPhase::Created,
                updated_at: now,
                metrics: SessionMetrics::default(),
                output: OutputRing::new(OUTPUT_RING_CAPACITY),
                last_error: None,
                history: Vec::new(),
                buffered_input: VecDeque::new(),
                restarts: VecDeque::new(),
                stop_requested: false,
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub async fn phase(&self) -> SessionPhase {
        self.body.lock().await.phase
    }

    /// Move the state machine to `next`, broadcasting a StatusChange.
    ///
    /// Illegal transitions fail with `InvalidState` and leave everything
    /// untouched.
    pub async fn transition(&self, next: SessionPhase, reason: &str) -> Result<SessionPhase, MeshError> {
        let old = {
            let mut body = self.body.lock().await;
            if !body.phase.can_transition(next) {
                return Err(MeshError::InvalidState);
            }
            let old = body.phase;
            body.phase = next;
            body.updated_at = monotonic_now(body.updated_at);
            old
        };
        self.broadcaster.broadcast(AgentEvent::now(
            &self.id,
            EventPayload::StatusChange {
                old: old.as_str().to_owned(),
                new: next.as_str().to_owned(),
                reason: reason.to_owned(),
            },
        ));
        Ok(old)
    }

    /// Fold a state-relevant event into the record.
    ///
    /// StatusChange events are not handled here; the pump routes those
    /// through [`transition`](Self::transition) so legality is enforced in
    /// one place.
    pub async fn apply_event(&self, event: &AgentEvent) {
        let mut body = self.body.lock().await;
        body.updated_at = monotonic_now(body.updated_at);
        match &event.payload {
            EventPayload::Output { content } => {
                body.output.push(content.as_bytes());
                body.history.push(MessageRecord {
                    role: "assistant".to_owned(),
                    content: content.clone(),
                    ts: event.timestamp,
                });
            }
            EventPayload::Metric { tokens_in, tokens_out, request_count } => {
                body.metrics.tokens_in = *tokens_in;
                body.metrics.tokens_out = *tokens_out;
                body.metrics.request_count = *request_count;
                body.metrics.last_activity_at = Some(event.timestamp);
            }
            EventPayload::Error { message, code } => {
                body.last_error =
                    Some(SessionLastError { message: message.clone(), code: code.clone() });
            }
            _ => {}
        }
    }

    /// Append a user message to the history.
    pub async fn push_user_message(&self, content: &str) {
        let mut body = self.body.lock().await;
        body.updated_at = monotonic_now(body.updated_at);
        body.history.push(MessageRecord {
            role: "user".to_owned(),
            content: content.to_owned(),
            ts: Utc::now(),
        });
    }

    /// Messages with `ts > since` (all when `since` is `None`).
    pub async fn messages_since(&self, since: Option<DateTime<Utc>>) -> Vec<MessageRecord> {
        let body = self.body.lock().await;
        match since {
            None => body.history.clone(),
            Some(since) => body.history.iter().filter(|m| m.ts > since).cloned().collect(),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        let body = self.body.lock().await;
        SessionStatus {
            id: self.id.clone(),
            provider_type: self.config.provider_type.clone(),
            kind: self.config.kind,
            project_id: self.config.project_id.clone(),
            state: body.phase.external(),
            phase: body.phase,
            created_at: self.created_at,
            updated_at: body.updated_at,
            metrics: body.metrics.clone(),
            last_output: body.output.tail(),
            last_error: body.last_error.clone(),
        }
    }

    pub(crate) fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Rebuild a record from its persisted form. The phase resets to
    /// `created` so the executor can decide whether to start it.
    pub fn rehydrate(
        stored: crate::storage::PersistedSession,
        adapter: Arc<dyn AgentAdapter>,
        broadcaster: Arc<EventBroadcaster>,
        dock: Option<Arc<DockBridge>>,
    ) -> Arc<Self> {
        let mut output = OutputRing::new(OUTPUT_RING_CAPACITY);
        if let Some(last) = stored.message_history.iter().rev().find(|m| m.role == "assistant") {
            output.push(last.content.as_bytes());
        }
        Arc::new(Self {
            id: stored.id,
            config: stored.config,
            created_at: stored.created_at,
            adapter,
            cancel: CancellationToken::new(),
            dock,
            broadcaster,
            body: Mutex::new(SessionBody {
                phase: SessionPhase::Created,
                updated_at: stored.updated_at,
                metrics: stored.metrics,
                output,
                last_error: stored.last_error,
                history: stored.message_history,
                buffered_input: VecDeque::new(),
                restarts: VecDeque::new(),
                stop_requested: false,
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Serializable view for storage.
    pub async fn to_persisted(&self) -> crate::storage::PersistedSession {
        let body = self.body.lock().await;
        crate::storage::PersistedSession {
            id: self.id.clone(),
            config: self.config.clone(),
            phase: body.phase,
            created_at: self.created_at,
            updated_at: body.updated_at,
            metrics: body.metrics.clone(),
            last_error: body.last_error.clone(),
            message_history: body.history.clone(),
        }
    }

    /// Apply an adapter-reported phase if the machine permits it, without
    /// emitting a StatusChange (the caller forwards the adapter's own
    /// event). Returns the previous phase, or `None` when illegal.
    pub(crate) async fn apply_phase(&self, next: SessionPhase) -> Option<SessionPhase> {
        let mut body = self.body.lock().await;
        if !body.phase.can_transition(next) {
            return None;
        }
        let old = body.phase;
        body.phase = next;
        body.updated_at = monotonic_now(body.updated_at);
        Some(old)
    }

    pub(crate) async fn mark_stop_requested(&self) {
        self.body.lock().await.stop_requested = true;
    }

    pub(crate) async fn phase_and_stop_requested(&self) -> (SessionPhase, bool) {
        let body = self.body.lock().await;
        (body.phase, body.stop_requested)
    }

    /// Buffer input while paused; `BufferFull` beyond `capacity`.
    pub(crate) async fn buffer_input(&self, text: &str, capacity: usize) -> Result<(), MeshError> {
        let mut body = self.body.lock().await;
        if body.buffered_input.len() >= capacity {
            return Err(MeshError::BufferFull);
        }
        body.buffered_input.push_back(text.to_owned());
        Ok(())
    }

    pub(crate) async fn take_buffered_input(&self) -> Vec<String> {
        self.body.lock().await.buffered_input.drain(..).collect()
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id)
            .field("provider_type", &self.config.provider_type)
            .field("kind", &self.config.kind)
            .finish()
    }
}

/// `Utc::now()` clamped so `updated_at` never moves backwards.
fn monotonic_now(prev: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(prev)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
