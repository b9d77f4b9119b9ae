// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal wire types: rendered snapshots, incremental updates, and input.
//!
//! Updates use externally visible `type` tags (`terminal.snapshot`,
//! `terminal.diff`, ...) so the hub's fan-out frames serialize directly onto
//! the WebSocket without re-wrapping.

pub mod hub;

pub use hub::TerminalHub;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rendered terminal screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSnapshot {
    pub rows: u16,
    pub cols: u16,
    pub lines: Vec<String>,
}

impl TerminalSnapshot {
    /// Blank screen used to prime subscribers before any adapter output.
    pub fn blank(rows: u16, cols: u16) -> Self {
        Self { rows, cols, lines: vec![String::new(); rows as usize] }
    }
}

/// One update fanned out to terminal subscribers.
///
/// `seq` is assigned by the hub at publish; adapters emit updates with
/// `seq = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TerminalUpdate {
    #[serde(rename = "terminal.snapshot")]
    Snapshot { seq: u64, rows: u16, cols: u16, lines: Vec<String> },
    #[serde(rename = "terminal.diff")]
    Diff { seq: u64, x0: u16, y0: u16, x1: u16, y1: u16, lines: Vec<String> },
    #[serde(rename = "terminal.cursor")]
    Cursor { seq: u64, row: u16, col: u16, visible: bool },
    #[serde(rename = "terminal.bell")]
    Bell { seq: u64 },
    #[serde(rename = "terminal.error")]
    Error { seq: u64, message: String, resync: bool },
}

impl TerminalUpdate {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Snapshot { seq, .. }
            | Self::Diff { seq, .. }
            | Self::Cursor { seq, .. }
            | Self::Bell { seq }
            | Self::Error { seq, .. } => *seq,
        }
    }

    pub(crate) fn set_seq(&mut self, new_seq: u64) {
        match self {
            Self::Snapshot { seq, .. }
            | Self::Diff { seq, .. }
            | Self::Cursor { seq, .. }
            | Self::Bell { seq }
            | Self::Error { seq, .. } => *seq = new_seq,
        }
    }
}

/// Keyboard, mouse, resize, and control input fanned in to the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalInput {
    Text {
        text: String,
    },
    Key {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rune: Option<char>,
        #[serde(default)]
        mods: u8,
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Mouse {
        button: u8,
        action: String,
        #[serde(default)]
        mods: u8,
        x: u16,
        y: u16,
        #[serde(default)]
        wheel: i8,
    },
    Resize {
        cols: u16,
        rows: u16,
    },
    Control {
        signal: ControlSignal,
    },
    /// Raw bytes, base64 on the wire. Only accepted when the caller
    /// explicitly allows it.
    Raw {
        #[serde(with = "b64")]
        bytes: Vec<u8>,
    },
}

/// Control signals deliverable through the terminal input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    Interrupt,
    Eof,
    Suspend,
}

/// Whether a terminal belongs to a session's PTY or was created ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    Pty,
    AdHoc,
}

/// Persisted terminal metadata plus the most recent snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalRecord {
    pub id: String,
    pub session_id: String,
    pub kind: TerminalKind,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub last_seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_snapshot: Option<TerminalSnapshot>,
}

/// Base64 (standard alphabet) serde adapter for raw input bytes.
mod b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Decode a standalone base64 payload (used by WS handlers before building
/// a [`TerminalInput::Raw`]).
pub fn decode_raw_payload(data: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD.decode(data.as_bytes()).ok()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
