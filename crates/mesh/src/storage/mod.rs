// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable persistence for session records, terminal records, and session
//! snapshots. Loaded at boot, written on mutation.

pub mod disk;
pub mod memory;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{
    MessageRecord, SessionConfig, SessionLastError, SessionMetrics, SessionPhase,
};
use crate::terminal::TerminalRecord;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable form of a session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub id: String,
    pub config: SessionConfig,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<SessionLastError>,
    #[serde(default)]
    pub message_history: Vec<MessageRecord>,
}

/// A persistable capture of session state produced through the adapter's
/// snapshot surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub provider_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
    pub config: SessionConfig,
    pub provider_state: HashMap<String, serde_json::Value>,
}

/// Persistence backend. All reads are safe to call concurrently with a
/// single writer.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn save_session(&self, session: &PersistedSession) -> Result<(), StorageError>;
    async fn load_session(&self, id: &str) -> Result<PersistedSession, StorageError>;
    async fn delete_session(&self, id: &str) -> Result<(), StorageError>;
    /// All sessions, optionally filtered by project id.
    async fn list_sessions(&self, project_id: Option<&str>)
        -> Result<Vec<PersistedSession>, StorageError>;

    async fn save_terminal(&self, terminal: &TerminalRecord) -> Result<(), StorageError>;
    async fn load_terminal(&self, id: &str) -> Result<TerminalRecord, StorageError>;
    async fn delete_terminal(&self, id: &str) -> Result<(), StorageError>;
    async fn list_terminals(&self) -> Result<Vec<TerminalRecord>, StorageError>;

    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError>;
    async fn load_snapshot(&self, session_id: &str) -> Result<SessionSnapshot, StorageError>;
    async fn delete_snapshot(&self, session_id: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
