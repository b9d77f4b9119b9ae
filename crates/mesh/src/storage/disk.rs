// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk storage: one JSON document per id, written atomically
//! (tmp + fsync + rename) so a crash mid-write never corrupts a record.
//!
//! The executor persists from live request paths, so every filesystem call
//! runs on the blocking pool via `spawn_blocking`; a slow disk must never
//! stall the runtime threads carrying SSE streams and pumps.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::terminal::TerminalRecord;

use super::{PersistedSession, SessionSnapshot, Storage, StorageError};

/// Storage rooted at a base directory with one subtree per record type.
pub struct DiskStorage {
    sessions_dir: PathBuf,
    terminals_dir: PathBuf,
    snapshots_dir: PathBuf,
}

/// Run a blocking storage operation off the async runtime.
async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T, StorageError> + Send + 'static,
) -> Result<T, StorageError> {
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result,
        Err(e) => Err(StorageError::Io(std::io::Error::other(e))),
    }
}

impl DiskStorage {
    pub fn new(base: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base = base.as_ref();
        let storage = Self {
            sessions_dir: base.join("sessions"),
            terminals_dir: base.join("terminals"),
            snapshots_dir: base.join("snapshots"),
        };
        fs::create_dir_all(&storage.sessions_dir)?;
        fs::create_dir_all(&storage.terminals_dir)?;
        fs::create_dir_all(&storage.snapshots_dir)?;
        Ok(storage)
    }

    fn doc_path(dir: &Path, id: &str) -> PathBuf {
        // Ids are server-generated UUIDs; the replacement guards against a
        // hand-edited store escaping its directory.
        let safe: String =
            id.chars().map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' }).collect();
        dir.join(format!("{safe}.json"))
    }

    fn write_doc<T: Serialize>(dir: &Path, id: &str, value: &T) -> Result<(), StorageError> {
        let path = Self::doc_path(dir, id);
        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_doc<T: DeserializeOwned>(dir: &Path, id: &str) -> Result<T, StorageError> {
        let path = Self::doc_path(dir, id);
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_owned()));
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn delete_doc(dir: &Path, id: &str) -> Result<(), StorageError> {
        let path = Self::doc_path(dir, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str(&contents) {
                Ok(value) => out.push(value),
                Err(e) => {
                    tracing::warn!(path = %path.display(), err = %e, "skipping corrupt document");
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Storage for DiskStorage {
    async fn save_session(&self, session: &PersistedSession) -> Result<(), StorageError> {
        let dir = self.sessions_dir.clone();
        let session = session.clone();
        run_blocking(move || Self::write_doc(&dir, &session.id, &session)).await
    }

    async fn load_session(&self, id: &str) -> Result<PersistedSession, StorageError> {
        let dir = self.sessions_dir.clone();
        let id = id.to_owned();
        run_blocking(move || Self::read_doc(&dir, &id)).await
    }

    async fn delete_session(&self, id: &str) -> Result<(), StorageError> {
        let dir = self.sessions_dir.clone();
        let id = id.to_owned();
        run_blocking(move || Self::delete_doc(&dir, &id)).await
    }

    async fn list_sessions(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<PersistedSession>, StorageError> {
        let dir = self.sessions_dir.clone();
        let project_id = project_id.map(String::from);
        run_blocking(move || {
            let sessions: Vec<PersistedSession> = Self::read_all(&dir)?;
            Ok(sessions
                .into_iter()
                .filter(|s| {
                    project_id
                        .as_deref()
                        .is_none_or(|p| s.config.project_id.as_deref() == Some(p))
                })
                .collect())
        })
        .await
    }

    async fn save_terminal(&self, terminal: &TerminalRecord) -> Result<(), StorageError> {
        let dir = self.terminals_dir.clone();
        let terminal = terminal.clone();
        run_blocking(move || Self::write_doc(&dir, &terminal.id, &terminal)).await
    }

    async fn load_terminal(&self, id: &str) -> Result<TerminalRecord, StorageError> {
        let dir = self.terminals_dir.clone();
        let id = id.to_owned();
        run_blocking(move || Self::read_doc(&dir, &id)).await
    }

    async fn delete_terminal(&self, id: &str) -> Result<(), StorageError> {
        let dir = self.terminals_dir.clone();
        let id = id.to_owned();
        run_blocking(move || Self::delete_doc(&dir, &id)).await
    }

    async fn list_terminals(&self) -> Result<Vec<TerminalRecord>, StorageError> {
        let dir = self.terminals_dir.clone();
        run_blocking(move || Self::read_all(&dir)).await
    }

    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let dir = self.snapshots_dir.clone();
        let snapshot = snapshot.clone();
        run_blocking(move || Self::write_doc(&dir, &snapshot.session_id, &snapshot)).await
    }

    async fn load_snapshot(&self, session_id: &str) -> Result<SessionSnapshot, StorageError> {
        let dir = self.snapshots_dir.clone();
        let session_id = session_id.to_owned();
        run_blocking(move || Self::read_doc(&dir, &session_id)).await
    }

    async fn delete_snapshot(&self, session_id: &str) -> Result<(), StorageError> {
        let dir = self.snapshots_dir.clone();
        let session_id = session_id.to_owned();
        run_blocking(move || Self::delete_doc(&dir, &session_id)).await
    }
}
