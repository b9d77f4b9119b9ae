// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent adapter contract and the factory registry keyed by provider type.
//!
//! The core never inspects adapter internals (process handles, stdio,
//! protocol framing). Optional capabilities — a terminal surface and a
//! snapshot surface — are discovered through feature traits rather than
//! runtime type queries.

pub mod mock;

pub use mock::MockAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::event::AgentEvent;
use crate::session::{SessionConfig, SessionMetrics};
use crate::terminal::{TerminalInput, TerminalSnapshot, TerminalUpdate};

/// Coarse adapter state reported by `status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterState {
    Created,
    Running,
    Paused,
    Stopped,
    Failed,
}

/// Status and usage counters reported by an adapter. Always safe to read
/// concurrently with any other adapter call.
#[derive(Debug, Clone)]
pub struct AdapterStatus {
    pub state: AdapterState,
    pub metrics: SessionMetrics,
}

/// The capability set every agent backend must expose.
///
/// Object-safe for use as `Arc<dyn AgentAdapter>`.
#[async_trait]
pub trait AgentAdapter: Send + Sync + 'static {
    /// Transition to running and begin producing events.
    ///
    /// The returned channel is the adapter's events-out surface; it is
    /// closed exactly once when the adapter exits, whether through `stop`,
    /// `kill`, or a crash.
    async fn start(&self) -> anyhow::Result<mpsc::Receiver<AgentEvent>>;

    /// Graceful wind-down; closes the events channel as its last action.
    async fn stop(&self) -> anyhow::Result<()>;

    async fn pause(&self) -> anyhow::Result<()>;

    async fn resume(&self) -> anyhow::Result<()>;

    /// Hard close. Must be safe to call after `stop`.
    fn kill(&self);

    fn status(&self) -> AdapterStatus;

    async fn send_input(&self, text: &str) -> anyhow::Result<()>;

    /// Terminal capability, when the backend renders a screen.
    fn terminal(&self) -> Option<&dyn TerminalSurface> {
        None
    }

    /// Snapshot capability, when the backend can externalize its state.
    fn snapshots(&self) -> Option<&dyn Snapshottable> {
        None
    }
}

/// Optional PTY-style surface: rendered snapshots out, input in.
#[async_trait]
pub trait TerminalSurface: Send + Sync {
    /// Current rendered screen.
    fn snapshot(&self) -> TerminalSnapshot;

    /// Subscribe to updates with the given channel capacity. Dropping the
    /// receiver cancels the subscription.
    fn subscribe_updates(&self, buffer: usize) -> mpsc::Receiver<TerminalUpdate>;

    async fn handle_input(&self, input: TerminalInput) -> anyhow::Result<()>;
}

/// Optional snapshot surface for persistence and resume.
pub trait Snapshottable: Send + Sync {
    /// Opaque provider state to persist.
    fn create_snapshot(&self) -> HashMap<String, serde_json::Value>;

    /// Restore previously captured provider state.
    fn restore_from_snapshot(
        &self,
        state: &HashMap<String, serde_json::Value>,
    ) -> anyhow::Result<()>;
}

/// Constructor for one adapter instance bound to a session.
pub type AdapterFactory =
    Arc<dyn Fn(&str, &SessionConfig) -> Arc<dyn AgentAdapter> + Send + Sync>;

/// Factory table keyed by `provider_type`.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `mock` provider (terminal-capable and
    /// snapshottable), used by tests and demos.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("mock", |session_id, _config| {
            Arc::new(MockAdapter::new(session_id).with_terminal()) as Arc<dyn AgentAdapter>
        });
        registry
    }

    pub fn register(
        &mut self,
        provider_type: impl Into<String>,
        factory: impl Fn(&str, &SessionConfig) -> Arc<dyn AgentAdapter> + Send + Sync + 'static,
    ) {
        self.factories.insert(provider_type.into(), Arc::new(factory));
    }

    pub fn resolve(&self, provider_type: &str) -> Option<AdapterFactory> {
        self.factories.get(provider_type).cloned()
    }

    pub fn provider_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
