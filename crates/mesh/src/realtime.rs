// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime topics and wire frames for the multi-topic WebSocket.
//!
//! A client subscribes to topics by name; the server answers each new topic
//! with a `snapshot` frame and follows with `event` frames. Both sides use
//! internally-tagged JSON.

use serde::{Deserialize, Serialize};

/// A subscribable stream of state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// StatusChange events of all sessions; snapshot is the session list.
    SessionsState,
    /// Every event of one session; snapshot is its status.
    SessionActivity(String),
    /// Terminal inventory; snapshot is the terminal record list.
    TerminalsState,
    /// One terminal's updates; snapshot is its rendered screen.
    TerminalOutput(String),
}

impl Topic {
    /// Parse a wire topic name (e.g. `sessions.activity:abc`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sessions.state" => Some(Self::SessionsState),
            "terminals.state" => Some(Self::TerminalsState),
            _ => {
                if let Some(id) = name.strip_prefix("sessions.activity:") {
                    (!id.is_empty()).then(|| Self::SessionActivity(id.to_owned()))
                } else if let Some(id) = name.strip_prefix("terminals.output:") {
                    (!id.is_empty()).then(|| Self::TerminalOutput(id.to_owned()))
                } else {
                    None
                }
            }
        }
    }

    /// Wire name of this topic.
    pub fn name(&self) -> String {
        match self {
            Self::SessionsState => "sessions.state".to_owned(),
            Self::SessionActivity(id) => format!("sessions.activity:{id}"),
            Self::TerminalsState => "terminals.state".to_owned(),
            Self::TerminalOutput(id) => format!("terminals.output:{id}"),
        }
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        topics: Vec<String>,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
    Ping {},
}

/// Frames sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Snapshot {
        topic: String,
        payload: serde_json::Value,
    },
    Event {
        topic: String,
        payload: serde_json::Value,
    },
    Pong {},
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        payload: serde_json::Value,
    },
}

impl ServerFrame {
    pub fn error(topic: Option<String>, message: impl Into<String>) -> Self {
        Self::Error { topic, payload: serde_json::json!({ "message": message.into() }) }
    }
}

#[cfg(test)]
#[path = "realtime_tests.rs"]
mod tests;
