// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session pump tasks.
//!
//! The event pump reads the adapter's event channel until it closes or the
//! session is cancelled, folding state-relevant events into the record and
//! forwarding everything to the broadcaster. The terminal pump forwards
//! adapter terminal updates into the session's hub.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::{AgentEvent, EventPayload};
use crate::terminal::TerminalHub;

use super::executor::SessionExecutor;
use super::{SessionPhase, SessionRecord};

/// Why the event pump stopped reading.
pub(crate) enum PumpExit {
    /// The adapter closed its events channel.
    ChannelClosed,
    /// The session's cancellation token fired first.
    Cancelled,
}

/// Drive one session's event channel to completion.
///
/// Returns how the loop ended; the executor decides between the stop path
/// and a crash restart.
pub(crate) async fn event_pump(
    record: &Arc<SessionRecord>,
    rx: &mut mpsc::Receiver<AgentEvent>,
) -> PumpExit {
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    return PumpExit::ChannelClosed;
                };
                apply_and_publish(record, event).await;
            }
            _ = record.cancel.cancelled() => {
                // Drain whatever the adapter already queued so final output
                // is not lost.
                while let Ok(event) = rx.try_recv() {
                    apply_and_publish(record, event).await;
                }
                return PumpExit::Cancelled;
            }
        }
    }
}

/// Fold one event into the record and broadcast it.
async fn apply_and_publish(record: &Arc<SessionRecord>, event: AgentEvent) {
    if let EventPayload::StatusChange { ref new, .. } = event.payload {
        // Adapter-driven phase changes go through the state machine so
        // legality is enforced in one place. The broadcast below carries the
        // adapter's own event; apply_phase stays silent.
        if let Some(next) = parse_phase(new) {
            if record.apply_phase(next).await.is_none() {
                debug!(
                    session_id = %record.id,
                    next = %new,
                    "ignoring illegal adapter status change"
                );
            }
        }
    } else {
        record.apply_event(&event).await;
    }
    record.broadcaster().broadcast(event);
}

fn parse_phase(name: &str) -> Option<SessionPhase> {
    match name {
        "created" => Some(SessionPhase::Created),
        "starting" => Some(SessionPhase::Starting),
        "running" => Some(SessionPhase::Running),
        "paused" => Some(SessionPhase::Paused),
        "stopping" => Some(SessionPhase::Stopping),
        "stopped" => Some(SessionPhase::Stopped),
        "error" => Some(SessionPhase::Error),
        _ => None,
    }
}

/// Spawn the event pump plus the executor's exit handling. The handle is
/// parked on the record so stop can await drainage.
pub(crate) async fn spawn_event_pump(
    executor: Arc<SessionExecutor>,
    record: Arc<SessionRecord>,
    mut rx: mpsc::Receiver<AgentEvent>,
) {
    let pumped = Arc::clone(&record);
    let handle = tokio::spawn(async move {
        let exit = event_pump(&pumped, &mut rx).await;
        executor.on_pump_exit(pumped, exit).await;
    });
    record.tasks.lock().await.push(handle);
}

/// Spawn the terminal pump: adapter updates → hub, with terminal-record
/// persistence on snapshot updates.
pub(crate) async fn spawn_terminal_pump(
    executor: Arc<SessionExecutor>,
    record: Arc<SessionRecord>,
    hub: Arc<TerminalHub>,
    buffer: usize,
) {
    let Some(surface) = record.adapter.terminal() else {
        return;
    };
    let mut updates = surface.subscribe_updates(buffer);
    let pumped = Arc::clone(&record);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => {
                    let Some(update) = update else { break };
                    let is_snapshot =
                        matches!(update, crate::terminal::TerminalUpdate::Snapshot { .. });
                    hub.publish(update);
                    if is_snapshot {
                        if let Err(e) = executor.persist_terminal(&hub).await {
                            warn!(terminal_id = %hub.id(), err = %e, "terminal persist failed");
                        }
                    }
                }
                _ = pumped.cancel.cancelled() => break,
            }
        }
    });
    record.tasks.lock().await.push(handle);
}

#[cfg(test)]
#[path = "pump_tests.rs"]
mod tests;
