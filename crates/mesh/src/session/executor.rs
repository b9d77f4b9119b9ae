// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session executor: the registry and lifecycle controller for all
//! sessions.
//!
//! Lock discipline: the registry lock is held only for map lookups and
//! check-and-insert; adapter calls and channel operations always happen
//! outside it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agent::AdapterRegistry;
use crate::breaker::CircuitBreaker;
use crate::broadcast::EventBroadcaster;
use crate::dock::DockBridge;
use crate::error::MeshError;
use crate::snapshot::SnapshotManager;
use crate::storage::{Storage, StorageError};
use crate::terminal::{TerminalHub, TerminalKind, TerminalRecord, TerminalSnapshot};

use super::pump::{self, PumpExit};
use super::{SessionConfig, SessionPhase, SessionRecord, SessionStatus, INPUT_BUFFER_CAPACITY};

/// Tunables for the executor; defaults match the documented behaviour.
#[derive(Debug, Clone)]
pub struct ExecutorLimits {
    /// Cooperative stop budget before `kill` escalation.
    pub stop_grace: Duration,
    /// Crash restarts allowed within `restart_window`.
    pub restart_max: usize,
    pub restart_window: Duration,
    /// Start/stop failures within `breaker_window` that open the breaker.
    pub breaker_threshold: usize,
    pub breaker_window: Duration,
    pub breaker_cooldown: Duration,
    /// Queue capacity handed to event and terminal subscribers.
    pub subscriber_buffer: usize,
    /// Dock bridge response timeout.
    pub dock_timeout: Duration,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
            restart_max: 3,
            restart_window: Duration::from_secs(60),
            breaker_threshold: 3,
            breaker_window: Duration::from_secs(30),
            breaker_cooldown: Duration::from_secs(30),
            subscriber_buffer: crate::broadcast::SUBSCRIBER_BUFFER,
            dock_timeout: crate::dock::RESPONSE_TIMEOUT,
        }
    }
}

/// Registry and lifecycle controller for all sessions.
pub struct SessionExecutor {
    sessions: RwLock<HashMap<String, Arc<SessionRecord>>>,
    /// Live terminal hubs keyed by terminal id (session id for PTY hubs).
    hubs: RwLock<HashMap<String, Arc<TerminalHub>>>,
    registry: AdapterRegistry,
    broadcaster: Arc<EventBroadcaster>,
    storage: Arc<dyn Storage>,
    snapshots: Arc<SnapshotManager>,
    breakers: parking_lot::Mutex<HashMap<String, CircuitBreaker>>,
    accepting: AtomicBool,
    limits: ExecutorLimits,
}

impl SessionExecutor {
    pub fn new(
        registry: AdapterRegistry,
        broadcaster: Arc<EventBroadcaster>,
        storage: Arc<dyn Storage>,
        snapshots: Arc<SnapshotManager>,
        limits: ExecutorLimits,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            hubs: RwLock::new(HashMap::new()),
            registry,
            broadcaster,
            storage,
            snapshots,
            breakers: parking_lot::Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            limits,
        })
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    pub fn limits(&self) -> &ExecutorLimits {
        &self.limits
    }

    /// Whether a factory is registered for this provider tag.
    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.registry.resolve(provider_type).is_some()
    }

    /// Remaining breaker cooldown for a provider, if its breaker is open.
    pub fn cooldown_remaining(&self, provider_type: &str) -> Option<Duration> {
        self.breakers.lock().get_mut(provider_type).and_then(|b| b.cooldown_remaining())
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Create and start a session.
    ///
    /// With `id: None` a fresh UUID is allocated and a start failure removes
    /// the record again. With an explicit id (rehydrated sessions), the
    /// record must be in `created`; a failure leaves it behind in `error`
    /// for inspection.
    pub async fn start_session(
        self: &Arc<Self>,
        id: Option<String>,
        config: SessionConfig,
    ) -> Result<Arc<SessionRecord>, MeshError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(MeshError::ShuttingDown);
        }
        if self.cooldown_remaining(&config.provider_type).is_some() {
            return Err(MeshError::Internal);
        }
        let factory =
            self.registry.resolve(&config.provider_type).ok_or(MeshError::ProviderNotFound)?;

        let fresh = id.is_none();
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let record = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(&id) {
                Some(existing) => {
                    // Only a rehydrated, never-started record may be started
                    // under an existing id.
                    if existing.phase().await != SessionPhase::Created {
                        return Err(MeshError::SessionExists);
                    }
                    Arc::clone(existing)
                }
                None => {
                    let adapter = factory(&id, &config);
                    let dock = config.kind.is_dock().then(|| {
                        Arc::new(DockBridge::new(self.limits.dock_timeout))
                    });
                    let record = SessionRecord::new(
                        &id,
                        config,
                        adapter,
                        Arc::clone(&self.broadcaster),
                        dock,
                    );
                    sessions.insert(id.clone(), Arc::clone(&record));
                    record
                }
            }
        };

        match self.start_record(&record).await {
            Ok(()) => Ok(record),
            Err(e) => {
                if fresh {
                    self.remove_record(&record.id).await;
                }
                Err(e)
            }
        }
    }

    /// Drive a `created` record through starting into running.
    async fn start_record(self: &Arc<Self>, record: &Arc<SessionRecord>) -> Result<(), MeshError> {
        record.transition(SessionPhase::Starting, "start requested").await?;

        // Restore provider state from a prior snapshot when both sides
        // support it. Version mismatches are skipped, not fatal.
        if let Some(surface) = record.adapter.snapshots() {
            match self.snapshots.restore(&record.id).await {
                Ok(snapshot) => {
                    if let Err(e) = surface.restore_from_snapshot(&snapshot.provider_state) {
                        warn!(session_id = %record.id, err = %e, "snapshot restore failed");
                    }
                }
                Err(MeshError::SnapshotNotFound) => {}
                Err(e) => {
                    warn!(session_id = %record.id, err = %e, "skipping stored snapshot");
                }
            }
        }

        match record.adapter.start().await {
            Ok(rx) => {
                self.record_breaker(&record.config.provider_type, true);
                record.transition(SessionPhase::Running, "adapter started").await?;
                pump::spawn_event_pump(Arc::clone(self), Arc::clone(record), rx).await;
                self.attach_terminal(record).await;
                self.snapshots.start_auto(Arc::clone(record));
                self.persist(record).await;
                info!(session_id = %record.id, provider = %record.config.provider_type, "session started");
                Ok(())
            }
            Err(e) => {
                self.record_breaker(&record.config.provider_type, false);
                let reason = format!("adapter start failed: {e}");
                let _ = record.transition(SessionPhase::Error, &reason).await;
                self.persist(record).await;
                warn!(session_id = %record.id, err = %e, "session start failed");
                Err(MeshError::Internal)
            }
        }
    }

    /// Create the hub and terminal pump for a terminal-capable adapter.
    async fn attach_terminal(self: &Arc<Self>, record: &Arc<SessionRecord>) {
        if record.adapter.terminal().is_none() {
            return;
        }
        let hub = TerminalHub::new(
            &record.id,
            &record.id,
            TerminalKind::Pty,
            Some(Arc::clone(&record.adapter)),
        );
        self.hubs.write().await.insert(record.id.clone(), Arc::clone(&hub));
        pump::spawn_terminal_pump(
            Arc::clone(self),
            Arc::clone(record),
            Arc::clone(&hub),
            self.limits.subscriber_buffer,
        )
        .await;
        if let Err(e) = self.persist_terminal(&hub).await {
            warn!(terminal_id = %hub.id(), err = %e, "terminal persist failed");
        }
    }

    pub async fn get_session(&self, id: &str) -> Result<Arc<SessionRecord>, MeshError> {
        self.sessions.read().await.get(id).cloned().ok_or(MeshError::SessionNotFound)
    }

    pub async fn get_session_status(&self, id: &str) -> Result<SessionStatus, MeshError> {
        Ok(self.get_session(id).await?.status().await)
    }

    pub async fn list_sessions(&self, project_id: Option<&str>) -> Vec<SessionStatus> {
        let records: Vec<Arc<SessionRecord>> =
            self.sessions.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            if project_id.is_some_and(|p| record.config.project_id.as_deref() != Some(p)) {
                continue;
            }
            statuses.push(record.status().await);
        }
        statuses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        statuses
    }

    pub async fn pause_session(&self, id: &str) -> Result<(), MeshError> {
        let record = self.get_session(id).await?;
        if record.phase().await != SessionPhase::Running {
            return Err(MeshError::InvalidState);
        }
        record.adapter.pause().await.map_err(|_| MeshError::Internal)?;
        record.transition(SessionPhase::Paused, "pause requested").await?;
        self.persist(&record).await;
        Ok(())
    }

    pub async fn resume_session(&self, id: &str) -> Result<(), MeshError> {
        let record = self.get_session(id).await?;
        if record.phase().await != SessionPhase::Paused {
            return Err(MeshError::InvalidState);
        }
        record.adapter.resume().await.map_err(|_| MeshError::Internal)?;

        // Deliver buffered input in FIFO order before new input can race in.
        let buffered = record.take_buffered_input().await;
        for text in buffered {
            if let Err(e) = record.adapter.send_input(&text).await {
                warn!(session_id = %id, err = %e, "buffered input delivery failed");
            }
        }
        record.transition(SessionPhase::Running, "resume requested").await?;
        self.persist(&record).await;
        Ok(())
    }

    /// Stop a session. Success when the session is already gone or stopped.
    pub async fn stop_session(self: &Arc<Self>, id: &str) -> Result<(), MeshError> {
        let Some(record) = self.sessions.read().await.get(id).cloned() else {
            return Ok(());
        };
        let phase = record.phase().await;
        if phase == SessionPhase::Stopped {
            return Ok(());
        }
        record.mark_stop_requested().await;

        if phase == SessionPhase::Created {
            // Never started: no adapter or pump to wind down.
            let _ = record.transition(SessionPhase::Stopping, "stop requested").await;
            self.finish_stop(&record).await;
            return Ok(());
        }

        if phase != SessionPhase::Stopping {
            let _ = record.transition(SessionPhase::Stopping, "stop requested").await;
        }

        // Cooperative stop with kill escalation.
        match tokio::time::timeout(self.limits.stop_grace, record.adapter.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session_id = %id, err = %e, "adapter stop failed, killing");
                self.record_breaker(&record.config.provider_type, false);
                record.adapter.kill();
            }
            Err(_) => {
                warn!(session_id = %id, "adapter stop timed out, killing");
                record.adapter.kill();
            }
        }

        // The pump observes the channel close and completes the stop; the
        // cancel token covers adapters that fail to close their channel.
        record.cancel.cancel();
        self.await_pumps(&record).await;
        self.finish_stop(&record).await;
        Ok(())
    }

    /// Idempotent tail of the stop path: final transition, cleanup, removal.
    async fn finish_stop(self: &Arc<Self>, record: &Arc<SessionRecord>) {
        if record.transition(SessionPhase::Stopped, "stopped").await.is_ok() {
            info!(session_id = %record.id, "session stopped");
        }
        self.snapshots.stop_auto(&record.id);
        record.cancel.cancel();
        self.remove_record(&record.id).await;
    }

    /// Remove a session from the registry, storage, and the replay log.
    /// The terminal's stored record survives for later reads.
    async fn remove_record(&self, id: &str) {
        self.sessions.write().await.remove(id);
        self.hubs.write().await.remove(id);
        if let Err(e) = self.storage.delete_session(id).await {
            warn!(session_id = %id, err = %e, "session delete failed");
        }
        let _ = self.storage.delete_snapshot(id).await;
        self.broadcaster.forget_session(id);
    }

    /// Wait for this record's pump tasks to finish, bounded by stop grace.
    async fn await_pumps(&self, record: &Arc<SessionRecord>) {
        let handles: Vec<_> = record.tasks.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }
        let _ = tokio::time::timeout(self.limits.stop_grace, join_all(handles)).await;
    }

    /// Called by the event pump when the adapter channel closes or the
    /// session is cancelled.
    ///
    /// Returns a boxed future (rather than `async fn`) because this call
    /// chain is mutually recursive with `pump::spawn_event_pump` on the
    /// crash-restart path; boxing breaks the opaque-type cycle the
    /// compiler would otherwise need to resolve for the auto `Send` bound.
    pub(crate) fn on_pump_exit(
        self: Arc<Self>,
        record: Arc<SessionRecord>,
        exit: PumpExit,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let (phase, stop_requested) = record.phase_and_stop_requested().await;

            let crashed = matches!(exit, PumpExit::ChannelClosed)
                && !stop_requested
                && phase == SessionPhase::Running;

            if crashed && self.accepting.load(Ordering::Acquire) {
                if record.count_restart(self.limits.restart_max, self.limits.restart_window).await
                {
                    info!(session_id = %record.id, "adapter crashed, restarting");
                    if record.transition(SessionPhase::Starting, "crash restart").await.is_ok() {
                        match record.adapter.start().await {
                            Ok(rx) => {
                                let _ = record
                                    .transition(SessionPhase::Running, "adapter restarted")
                                    .await;
                                pump::spawn_event_pump(Arc::clone(&self), record, rx).await;
                                return;
                            }
                            Err(e) => {
                                let reason = format!("crash restart failed: {e}");
                                let _ = record.transition(SessionPhase::Error, &reason).await;
                                self.persist(&record).await;
                                return;
                            }
                        }
                    }
                } else {
                    warn!(session_id = %record.id, "restart budget exhausted");
                    let _ =
                        record.transition(SessionPhase::Error, "restart budget exhausted").await;
                    self.persist(&record).await;
                    return;
                }
            }

            // Normal wind-down: channel closed during stop, or cancellation.
            if phase != SessionPhase::Stopped {
                if !matches!(phase, SessionPhase::Stopping) {
                    let _ = record.transition(SessionPhase::Stopping, "adapter exited").await;
                }
                self.finish_stop(&record).await;
            }
        })
    }

    // -- Input ----------------------------------------------------------------

    /// Deliver input to a running session, buffering while paused.
    pub async fn send_input(&self, id: &str, text: &str) -> Result<(), MeshError> {
        let record = self.get_session(id).await?;
        match record.phase().await {
            SessionPhase::Running => {
                record.adapter.send_input(text).await.map_err(|_| MeshError::Internal)
            }
            SessionPhase::Paused => record.buffer_input(text, INPUT_BUFFER_CAPACITY).await,
            _ => Err(MeshError::InvalidState),
        }
    }

    /// Deliver a user message: recorded in the history, then sent as input.
    ///
    /// `provider_type` must match the session's provider when given.
    pub async fn send_message(
        &self,
        id: &str,
        content: &str,
        provider_type: Option<&str>,
    ) -> Result<(), MeshError> {
        let record = self.get_session(id).await?;
        if provider_type.is_some_and(|p| p != record.config.provider_type) {
            return Err(MeshError::BadRequest);
        }
        record.push_user_message(content).await;
        match record.phase().await {
            SessionPhase::Running => {
                record.adapter.send_input(content).await.map_err(|_| MeshError::Internal)
            }
            SessionPhase::Paused => record.buffer_input(content, INPUT_BUFFER_CAPACITY).await,
            _ => Err(MeshError::InvalidState),
        }
    }

    // -- Terminals ------------------------------------------------------------

    /// The live terminal hub of a session.
    pub async fn terminal_hub(&self, session_id: &str) -> Result<Arc<TerminalHub>, MeshError> {
        let _record = self.get_session(session_id).await?;
        self.hubs
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or(MeshError::TerminalNotSupported)
    }

    pub async fn terminal_snapshot(
        &self,
        session_id: &str,
    ) -> Result<TerminalSnapshot, MeshError> {
        Ok(self.terminal_hub(session_id).await?.snapshot())
    }

    /// All known terminals: stored records overlaid with live hub state.
    pub async fn list_terminals(&self) -> Vec<TerminalRecord> {
        let mut by_id: HashMap<String, TerminalRecord> = match self.storage.list_terminals().await
        {
            Ok(records) => records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            Err(e) => {
                warn!(err = %e, "terminal list failed");
                HashMap::new()
            }
        };
        for hub in self.hubs.read().await.values() {
            let record = hub.record();
            by_id.insert(record.id.clone(), record);
        }
        let mut records: Vec<_> = by_id.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    pub async fn get_terminal(&self, id: &str) -> Result<TerminalRecord, MeshError> {
        if let Some(hub) = self.hubs.read().await.get(id) {
            return Ok(hub.record());
        }
        match self.storage.load_terminal(id).await {
            Ok(record) => Ok(record),
            Err(StorageError::NotFound(_)) => Err(MeshError::TerminalNotFound),
            Err(_) => Err(MeshError::Internal),
        }
    }

    pub async fn delete_terminal(&self, id: &str) -> Result<(), MeshError> {
        let live = self.hubs.write().await.remove(id).is_some();
        let stored = self.storage.load_terminal(id).await.is_ok();
        if !live && !stored {
            return Err(MeshError::TerminalNotFound);
        }
        self.storage.delete_terminal(id).await.map_err(|_| MeshError::Internal)
    }

    pub(crate) async fn persist_terminal(&self, hub: &TerminalHub) -> Result<(), StorageError> {
        self.storage.save_terminal(&hub.record()).await
    }

    // -- Projects -------------------------------------------------------------

    /// Best-effort stop of every session in a project.
    pub async fn delete_project_sessions(self: &Arc<Self>, project_id: &str) {
        let ids: Vec<String> = self
            .list_sessions(Some(project_id))
            .await
            .into_iter()
            .map(|status| status.id)
            .collect();
        for id in ids {
            if let Err(e) = self.stop_session(&id).await {
                warn!(session_id = %id, err = %e, "project cascade stop failed");
            }
        }
    }

    // -- Boot & shutdown ------------------------------------------------------

    /// Rehydrate persisted sessions into the registry, restarting those
    /// that were live when the process went down.
    pub async fn restore_persisted(self: &Arc<Self>) {
        let persisted = match self.storage.list_sessions(None).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(err = %e, "session rehydration failed");
                return;
            }
        };
        for stored in persisted {
            let Some(factory) = self.registry.resolve(&stored.config.provider_type) else {
                warn!(
                    session_id = %stored.id,
                    provider = %stored.config.provider_type,
                    "skipping stored session with unknown provider"
                );
                continue;
            };
            let adapter = factory(&stored.id, &stored.config);
            let dock = stored.config.kind.is_dock().then(|| {
                Arc::new(DockBridge::new(self.limits.dock_timeout))
            });
            let was_live = matches!(
                stored.phase,
                SessionPhase::Starting | SessionPhase::Running | SessionPhase::Paused
            );
            let record = SessionRecord::rehydrate(
                stored,
                adapter,
                Arc::clone(&self.broadcaster),
                dock,
            );
            self.sessions.write().await.insert(record.id.clone(), Arc::clone(&record));
            debug!(session_id = %record.id, "session rehydrated");

            if was_live {
                if let Err(e) = self.start_record(&record).await {
                    warn!(session_id = %record.id, err = %e, "rehydrated session restart failed");
                }
            }
        }
    }

    /// Stop everything, bounded by `deadline`. Stragglers are killed.
    pub async fn shutdown(self: &Arc<Self>, deadline: Duration) {
        self.accepting.store(false, Ordering::Release);
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();

        let stops = ids.iter().map(|id| self.stop_session(id));
        if tokio::time::timeout(deadline, join_all(stops)).await.is_err() {
            warn!("shutdown deadline reached, killing stragglers");
            let stragglers: Vec<Arc<SessionRecord>> =
                self.sessions.read().await.values().cloned().collect();
            for record in stragglers {
                record.adapter.kill();
                record.cancel.cancel();
                self.remove_record(&record.id).await;
            }
        }
        info!("executor shut down");
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // -- Internals ------------------------------------------------------------

    fn record_breaker(&self, provider_type: &str, success: bool) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(provider_type.to_owned()).or_insert_with(|| {
            CircuitBreaker::new(
                self.limits.breaker_threshold,
                self.limits.breaker_window,
                self.limits.breaker_cooldown,
            )
        });
        if success {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
    }

    /// Write the record through storage; failures are logged, not fatal.
    pub(crate) async fn persist(&self, record: &Arc<SessionRecord>) {
        let persisted = record.to_persisted().await;
        if let Err(e) = self.storage.save_session(&persisted).await {
            warn!(session_id = %record.id, err = %e, "session persist failed");
        }
    }
}

// Restart bookkeeping lives on the record so the budget survives executor
// call boundaries.
impl SessionRecord {
    /// Record a restart attempt; false when the budget is exhausted.
    pub(crate) async fn count_restart(&self, max: usize, window: Duration) -> bool {
        let mut body = self.body.lock().await;
        let now = Instant::now();
        while body.restarts.front().is_some_and(|t| now.duration_since(*t) > window) {
            body.restarts.pop_front();
        }
        if body.restarts.len() >= max {
            return false;
        }
        body.restarts.push_back(now);
        true
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
