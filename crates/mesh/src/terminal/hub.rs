// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-terminal fan-out hub with late-join snapshot priming.
//!
//! The hub owns the monotonic seq for its terminal. Diffs are folded into
//! the stored snapshot as they pass through, so a subscriber arriving later
//! is primed with one coherent snapshot rather than a snapshot plus a diff
//! backlog. Bell and cursor updates are broadcast but never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::agent::AgentAdapter;
use crate::error::MeshError;

use super::{TerminalInput, TerminalKind, TerminalRecord, TerminalSnapshot, TerminalUpdate};

/// Default per-subscriber update queue capacity.
pub const UPDATE_BUFFER: usize = 64;

/// Shape given to subscribers that join before any snapshot exists.
const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

struct HubState {
    snapshot: Option<TerminalSnapshot>,
    last_updated_at: DateTime<Utc>,
    subscribers: Vec<mpsc::Sender<TerminalUpdate>>,
}

/// Fan-out hub for one terminal.
pub struct TerminalHub {
    id: String,
    session_id: String,
    kind: TerminalKind,
    created_at: DateTime<Utc>,
    seq: AtomicU64,
    dropped: AtomicU64,
    state: Mutex<HubState>,
    /// Input sink; absent for hubs whose adapter has no terminal surface.
    adapter: Option<Arc<dyn AgentAdapter>>,
}

impl TerminalHub {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        kind: TerminalKind,
        adapter: Option<Arc<dyn AgentAdapter>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            session_id: session_id.into(),
            kind,
            created_at: Utc::now(),
            seq: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            state: Mutex::new(HubState {
                snapshot: None,
                last_updated_at: Utc::now(),
                subscribers: Vec::new(),
            }),
            adapter,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Assign the next seq, fold the update into the stored snapshot, and
    /// fan out. Returns the assigned seq.
    pub fn publish(&self, mut update: TerminalUpdate) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        update.set_seq(seq);

        let mut state = self.state.lock();
        state.last_updated_at = Utc::now();
        match &update {
            TerminalUpdate::Snapshot { rows, cols, lines, .. } => {
                state.snapshot =
                    Some(TerminalSnapshot { rows: *rows, cols: *cols, lines: lines.clone() });
            }
            TerminalUpdate::Diff { x0, y0, x1, y1, lines, .. } => {
                let snapshot = state
                    .snapshot
                    .get_or_insert_with(|| TerminalSnapshot::blank(DEFAULT_ROWS, DEFAULT_COLS));
                apply_diff(snapshot, *x0, *y0, *x1, *y1, lines);
            }
            TerminalUpdate::Cursor { .. }
            | TerminalUpdate::Bell { .. }
            | TerminalUpdate::Error { .. } => {}
        }

        state.subscribers.retain(|tx| match tx.try_send(update.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        seq
    }

    /// Subscribe with a bounded queue.
    ///
    /// The first update delivered is always a snapshot reflecting the
    /// current terminal state (a blank 24x80 shape when nothing has been
    /// published yet). Dropping the receiver cancels the subscription.
    pub fn subscribe(&self, buffer: usize) -> mpsc::Receiver<TerminalUpdate> {
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let mut state = self.state.lock();
        let snapshot = state
            .snapshot
            .clone()
            .unwrap_or_else(|| TerminalSnapshot::blank(DEFAULT_ROWS, DEFAULT_COLS));
        let prime = TerminalUpdate::Snapshot {
            seq: self.seq.load(Ordering::Relaxed),
            rows: snapshot.rows,
            cols: snapshot.cols,
            lines: snapshot.lines,
        };
        // Capacity is at least 1 and the channel is empty, so the prime
        // cannot be lost.
        let _ = tx.try_send(prime);
        state.subscribers.push(tx);
        rx
    }

    /// Forward input to the adapter's terminal surface.
    ///
    /// Raw input requires `allow_raw`; callers gate it on an explicit
    /// opt-in from the client.
    pub async fn handle_input(&self, input: TerminalInput, allow_raw: bool) -> Result<(), MeshError> {
        if matches!(input, TerminalInput::Raw { .. }) && !allow_raw {
            return Err(MeshError::Forbidden);
        }
        let Some(adapter) = self.adapter.as_ref() else {
            return Err(MeshError::TerminalNotSupported);
        };
        let Some(surface) = adapter.terminal() else {
            return Err(MeshError::TerminalNotSupported);
        };
        surface.handle_input(input).await.map_err(|_| MeshError::Internal)
    }

    /// Current snapshot (blank default before any update).
    pub fn snapshot(&self) -> TerminalSnapshot {
        self.state
            .lock()
            .snapshot
            .clone()
            .unwrap_or_else(|| TerminalSnapshot::blank(DEFAULT_ROWS, DEFAULT_COLS))
    }

    /// Monotonic counter value, used for error envelopes.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Persistable view of this terminal.
    pub fn record(&self) -> TerminalRecord {
        let state = self.state.lock();
        TerminalRecord {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            kind: self.kind,
            created_at: self.created_at,
            last_updated_at: state.last_updated_at,
            last_seq: self.seq.load(Ordering::Relaxed),
            last_snapshot: state.snapshot.clone(),
        }
    }
}

/// Overwrite the rectangle `(x0, y0)..=(x1, y1)` with `lines`, clamped to
/// the snapshot's shape. Rows without a replacement line are cleared.
fn apply_diff(snapshot: &mut TerminalSnapshot, x0: u16, y0: u16, x1: u16, y1: u16, lines: &[String]) {
    if snapshot.rows == 0 || snapshot.cols == 0 || y0 > y1 || x0 > x1 {
        return;
    }
    if snapshot.lines.len() < snapshot.rows as usize {
        snapshot.lines.resize(snapshot.rows as usize, String::new());
    }
    let max_row = snapshot.rows - 1;
    let max_col = snapshot.cols - 1;
    let x0 = x0.min(max_col) as usize;
    let x1 = x1.min(max_col) as usize;
    let width = x1 - x0 + 1;

    for (i, row) in (y0..=y1.min(max_row)).enumerate() {
        let replacement = lines.get(i).map(String::as_str).unwrap_or("");
        let line = &mut snapshot.lines[row as usize];
        let mut chars: Vec<char> = line.chars().collect();
        if chars.len() < x0 + width {
            chars.resize(x0 + width, ' ');
        }
        let mut source = replacement.chars();
        for cell in chars.iter_mut().skip(x0).take(width) {
            *cell = source.next().unwrap_or(' ');
        }
        *line = chars.into_iter().collect::<String>().trim_end().to_owned();
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
