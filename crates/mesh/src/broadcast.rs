// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event broadcaster: sequence stamping, per-subscriber bounded queues,
//! and a finite replay log for late joiners.
//!
//! Publish never blocks. A subscriber whose queue is full loses the event
//! and has its drop counter bumped; other subscribers are unaffected.
//! Registration and fan-out share one mutex, so a subscriber observes
//! exactly the events with `seq > since_seq` on its live channel — replay
//! for `(last_seen, since_seq]` comes from the retained log.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::AgentEvent;

/// Default per-subscriber queue capacity.
pub const SUBSCRIBER_BUFFER: usize = 256;

/// What a subscription wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event of one session.
    Session(String),
    /// StatusChange events of all sessions.
    SessionsState,
}

impl EventFilter {
    fn accepts(&self, event: &AgentEvent) -> bool {
        match self {
            Self::Session(id) => event.session_id == *id,
            Self::SessionsState => event.is_status_change(),
        }
    }
}

/// A live subscription handle. Dropping `rx` ends the subscription; the
/// broadcaster prunes the sender on the next publish.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<AgentEvent>,
    /// Broadcaster seq at registration: the live channel carries only
    /// events with `seq > since_seq`.
    pub since_seq: u64,
    pub dropped: Arc<AtomicU64>,
}

/// Result of a replay request.
#[derive(Debug, Clone)]
pub struct Replay {
    pub events: Vec<AgentEvent>,
    /// True when `last_seen` predates the retained window; the client
    /// should refetch a snapshot instead of trusting the replayed prefix.
    pub gap: bool,
}

struct Entry {
    filter: EventFilter,
    tx: mpsc::Sender<AgentEvent>,
    dropped: Arc<AtomicU64>,
}

/// Bounded event log that remembers how far eviction has progressed.
///
/// Seq values are process-wide, so a session's log is not contiguous; the
/// only reliable gap signal is "an event with seq > last_seen was evicted".
#[derive(Default)]
struct BoundedLog {
    events: VecDeque<AgentEvent>,
    evicted_through: u64,
}

impl BoundedLog {
    fn push(&mut self, event: AgentEvent, window: usize) {
        self.events.push_back(event);
        while self.events.len() > window {
            if let Some(evicted) = self.events.pop_front() {
                self.evicted_through = evicted.seq;
            }
        }
    }
}

struct ReplayLog {
    per_session: HashMap<String, BoundedLog>,
    global_state: BoundedLog,
}

struct Registry {
    subscribers: HashMap<u64, Entry>,
    replay: ReplayLog,
}

/// Multi-subscriber, sequence-stamped event fan-out.
pub struct EventBroadcaster {
    seq: AtomicU64,
    next_id: AtomicU64,
    registry: Mutex<Registry>,
    session_window: usize,
    global_window: usize,
    dropped_total: AtomicU64,
}

impl EventBroadcaster {
    /// `session_window` / `global_window` bound the replay log (events per
    /// session, StatusChange events globally).
    pub fn new(session_window: usize, global_window: usize) -> Self {
        Self {
            seq: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            registry: Mutex::new(Registry {
                subscribers: HashMap::new(),
                replay: ReplayLog {
                    per_session: HashMap::new(),
                    global_state: BoundedLog::default(),
                },
            }),
            session_window,
            global_window,
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Assign the next seq and fan the event out. Returns the assigned seq.
    pub fn broadcast(&self, mut event: AgentEvent) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        event.seq = seq;

        let mut registry = self.registry.lock();

        // Retain for replay before fan-out so a subscriber that joins
        // mid-publish can always recover this event.
        registry
            .replay
            .per_session
            .entry(event.session_id.clone())
            .or_default()
            .push(event.clone(), self.session_window);
        if event.is_status_change() {
            let window = self.global_window;
            registry.replay.global_state.push(event.clone(), window);
        }

        registry.subscribers.retain(|_, entry| {
            if !entry.filter.accepts(&event) {
                return !entry.tx.is_closed();
            }
            match entry.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    entry.dropped.fetch_add(1, Ordering::Relaxed);
                    self.dropped_total.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        seq
    }

    /// Register a subscriber with a bounded queue.
    pub fn subscribe(&self, filter: EventFilter, buffer: usize) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let mut registry = self.registry.lock();
        let since_seq = self.seq.load(Ordering::Relaxed);
        registry
            .subscribers
            .insert(id, Entry { filter, tx, dropped: Arc::clone(&dropped) });
        Subscription { id, rx, since_seq, dropped }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.registry.lock().subscribers.remove(&id);
    }

    /// Retained events matching `filter` with `last_seen < seq` (and
    /// `seq <= up_to` when given), in seq order.
    pub fn replay_from(&self, filter: &EventFilter, last_seen: u64, up_to: Option<u64>) -> Replay {
        let registry = self.registry.lock();
        let log: Option<&BoundedLog> = match filter {
            EventFilter::Session(id) => registry.replay.per_session.get(id),
            EventFilter::SessionsState => Some(&registry.replay.global_state),
        };
        let Some(log) = log else {
            return Replay { events: Vec::new(), gap: false };
        };

        let gap = last_seen < log.evicted_through;
        let events = log
            .events
            .iter()
            .filter(|e| e.seq > last_seen && up_to.is_none_or(|cap| e.seq <= cap))
            .cloned()
            .collect();
        Replay { events, gap }
    }

    /// Drop the retained log of a removed session.
    pub fn forget_session(&self, session_id: &str) {
        self.registry.lock().replay.per_session.remove(session_id);
    }

    pub fn subscriber_count(&self) -> usize {
        let mut registry = self.registry.lock();
        registry.subscribers.retain(|_, entry| !entry.tx.is_closed());
        registry.subscribers.len()
    }

    /// Events dropped across all subscribers since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Highest seq assigned so far.
    pub fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
