// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot manager: periodic and on-demand capture of session state, plus
//! the restore path used when sessions are rehydrated at boot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MeshError;
use crate::session::SessionRecord;
use crate::storage::{SessionSnapshot, Storage};

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Captures snapshots through the adapters' snapshot surface and writes
/// them to storage.
pub struct SnapshotManager {
    storage: Arc<dyn Storage>,
    interval: Duration,
    tickers: Mutex<HashMap<String, CancellationToken>>,
    /// Auto-snapshot failures are swallowed; this counts them.
    errors: AtomicU64,
}

impl SnapshotManager {
    pub fn new(storage: Arc<dyn Storage>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            storage,
            interval,
            tickers: Mutex::new(HashMap::new()),
            errors: AtomicU64::new(0),
        })
    }

    /// Capture one snapshot now.
    ///
    /// Fails with `TerminalNotSupported`-style absence mapped to
    /// `BadRequest` when the adapter has no snapshot surface.
    pub async fn snapshot(&self, record: &SessionRecord) -> Result<(), MeshError> {
        let Some(surface) = record.adapter.snapshots() else {
            return Err(MeshError::BadRequest);
        };
        let snapshot = SessionSnapshot {
            session_id: record.id.clone(),
            provider_type: record.config.provider_type.clone(),
            created_at: record.created_at,
            updated_at: Utc::now(),
            version: SNAPSHOT_VERSION,
            config: record.config.clone(),
            provider_state: surface.create_snapshot(),
        };
        self.storage.save_snapshot(&snapshot).await.map_err(|e| {
            warn!(session_id = %record.id, err = %e, "snapshot write failed");
            MeshError::Internal
        })
    }

    /// Spawn a ticker capturing snapshots of `record` until stopped.
    ///
    /// Errors inside the loop are swallowed and counted so one failing
    /// capture never kills the cadence.
    pub fn start_auto(self: &Arc<Self>, record: Arc<SessionRecord>) {
        if self.interval.is_zero() || record.adapter.snapshots().is_none() {
            return;
        }
        let cancel = record.cancel.child_token();
        let previous = self.tickers.lock().insert(record.id.clone(), cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the cadence
            // starts one interval after the session.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.snapshot(&record).await {
                            manager.errors.fetch_add(1, Ordering::Relaxed);
                            debug!(session_id = %record.id, err = %e, "auto snapshot failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    /// Cancel the ticker for a session, if any.
    pub fn stop_auto(&self, session_id: &str) {
        if let Some(cancel) = self.tickers.lock().remove(session_id) {
            cancel.cancel();
        }
    }

    /// Load a stored snapshot.
    ///
    /// A version mismatch fails with `IncompatibleVersion` and leaves the
    /// caller's state untouched.
    pub async fn restore(&self, session_id: &str) -> Result<SessionSnapshot, MeshError> {
        let snapshot = self.storage.load_snapshot(session_id).await.map_err(|e| match e {
            crate::storage::StorageError::NotFound(_) => MeshError::SnapshotNotFound,
            _ => MeshError::Internal,
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MeshError::IncompatibleVersion);
        }
        Ok(snapshot)
    }

    /// Auto-snapshot failures observed so far.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
