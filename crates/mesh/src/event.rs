// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed session events flowing from adapters through the broadcaster.
//!
//! Producers stamp `timestamp` when they construct an event; `seq` is zero
//! until the broadcaster assigns a process-wide monotonic value at publish.
//! Wire format uses an internally-tagged payload (`{"type": "output", ...}`)
//! so SSE and WebSocket clients can dispatch on a single field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single event emitted by a session's adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Assigned by the broadcaster at publish; producers leave this at 0.
    #[serde(default)]
    pub seq: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Event payload variants, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The session's lifecycle phase changed.
    StatusChange { old: String, new: String, reason: String },
    /// A chunk of agent output text.
    Output { content: String },
    /// Usage counters reported by the adapter.
    Metric { tokens_in: u64, tokens_out: u64, request_count: u64 },
    /// A non-fatal adapter error; does not move the state machine.
    Error { message: String, code: String },
    /// Free-form key/value annotation.
    Metadata { key: String, value: serde_json::Value },
    /// A tool invocation observed inside the agent.
    ToolCall {
        id: String,
        name: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },
    /// Model reasoning text.
    Thought { content: String },
    /// A plan proposed by the agent.
    Plan { steps: Vec<PlanStep>, description: String },
}

/// One step of a proposed plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub title: String,
    pub status: String,
}

impl AgentEvent {
    /// Construct an event stamped with the current wall-clock time.
    pub fn now(session_id: impl Into<String>, payload: EventPayload) -> Self {
        Self { session_id: session_id.into(), timestamp: Utc::now(), seq: 0, payload }
    }

    /// Wire name of the payload variant (used as the SSE `event:` field).
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::StatusChange { .. } => "status_change",
            EventPayload::Output { .. } => "output",
            EventPayload::Metric { .. } => "metric",
            EventPayload::Error { .. } => "error",
            EventPayload::Metadata { .. } => "metadata",
            EventPayload::ToolCall { .. } => "tool_call",
            EventPayload::Thought { .. } => "thought",
            EventPayload::Plan { .. } => "plan",
        }
    }

    /// Whether this event belongs on the global session-state stream.
    pub fn is_status_change(&self) -> bool {
        matches!(self.payload, EventPayload::StatusChange { .. })
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
