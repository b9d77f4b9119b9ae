// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::terminal::TerminalRecord;

use super::{PersistedSession, SessionSnapshot, Storage, StorageError};

/// Map-backed storage for tests and data-dir-less runs.
#[derive(Default)]
pub struct MemoryStorage {
    sessions: RwLock<HashMap<String, PersistedSession>>,
    terminals: RwLock<HashMap<String, TerminalRecord>>,
    snapshots: RwLock<HashMap<String, SessionSnapshot>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_session(&self, session: &PersistedSession) -> Result<(), StorageError> {
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<PersistedSession, StorageError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_owned()))
    }

    async fn delete_session(&self, id: &str) -> Result<(), StorageError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn list_sessions(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<PersistedSession>, StorageError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| project_id.is_none_or(|p| s.config.project_id.as_deref() == Some(p)))
            .cloned()
            .collect())
    }

    async fn save_terminal(&self, terminal: &TerminalRecord) -> Result<(), StorageError> {
        self.terminals.write().await.insert(terminal.id.clone(), terminal.clone());
        Ok(())
    }

    async fn load_terminal(&self, id: &str) -> Result<TerminalRecord, StorageError> {
        self.terminals
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_owned()))
    }

    async fn delete_terminal(&self, id: &str) -> Result<(), StorageError> {
        self.terminals.write().await.remove(id);
        Ok(())
    }

    async fn list_terminals(&self) -> Result<Vec<TerminalRecord>, StorageError> {
        Ok(self.terminals.read().await.values().cloned().collect())
    }

    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        self.snapshots.write().await.insert(snapshot.session_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, session_id: &str) -> Result<SessionSnapshot, StorageError> {
        self.snapshots
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(session_id.to_owned()))
    }

    async fn delete_snapshot(&self, session_id: &str) -> Result<(), StorageError> {
        self.snapshots.write().await.remove(session_id);
        Ok(())
    }
}
