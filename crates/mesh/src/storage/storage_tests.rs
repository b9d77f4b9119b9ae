// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::SessionKind;
use crate::terminal::{TerminalKind, TerminalSnapshot};
use chrono::Utc;

fn persisted(id: &str, project: Option<&str>) -> PersistedSession {
    let mut config = SessionConfig::new("mock");
    config.project_id = project.map(String::from);
    config.kind = SessionKind::Interactive;
    PersistedSession {
        id: id.to_owned(),
        config,
        phase: SessionPhase::Running,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        metrics: SessionMetrics::default(),
        last_error: None,
        message_history: vec![MessageRecord {
            role: "user".into(),
            content: "hi".into(),
            ts: Utc::now(),
        }],
    }
}

fn terminal(id: &str) -> TerminalRecord {
    TerminalRecord {
        id: id.to_owned(),
        session_id: id.to_owned(),
        kind: TerminalKind::Pty,
        created_at: Utc::now(),
        last_updated_at: Utc::now(),
        last_seq: 7,
        last_snapshot: Some(TerminalSnapshot {
            rows: 2,
            cols: 2,
            lines: vec!["hi".into(), String::new()],
        }),
    }
}

fn snapshot(id: &str) -> SessionSnapshot {
    SessionSnapshot {
        session_id: id.to_owned(),
        provider_type: "mock".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        version: 1,
        config: SessionConfig::new("mock"),
        provider_state: [("k".to_owned(), serde_json::json!("v"))].into_iter().collect(),
    }
}

async fn exercise_backend(storage: &dyn Storage) -> anyhow::Result<()> {
    // Sessions.
    storage.save_session(&persisted("s1", Some("p1"))).await?;
    storage.save_session(&persisted("s2", None)).await?;

    let loaded = storage.load_session("s1").await?;
    assert_eq!(loaded.phase, SessionPhase::Running);
    assert_eq!(loaded.message_history.len(), 1);

    assert_eq!(storage.list_sessions(None).await?.len(), 2);
    let filtered = storage.list_sessions(Some("p1")).await?;
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, "s1");

    storage.delete_session("s1").await?;
    assert!(matches!(storage.load_session("s1").await, Err(StorageError::NotFound(_))));
    // Deleting again is a no-op.
    storage.delete_session("s1").await?;

    // Terminals.
    storage.save_terminal(&terminal("t1")).await?;
    let loaded = storage.load_terminal("t1").await?;
    assert_eq!(loaded.last_seq, 7);
    assert_eq!(storage.list_terminals().await?.len(), 1);
    storage.delete_terminal("t1").await?;
    assert!(matches!(storage.load_terminal("t1").await, Err(StorageError::NotFound(_))));

    // Snapshots.
    storage.save_snapshot(&snapshot("s2")).await?;
    let loaded = storage.load_snapshot("s2").await?;
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.provider_state.get("k"), Some(&serde_json::json!("v")));
    storage.delete_snapshot("s2").await?;
    assert!(matches!(storage.load_snapshot("s2").await, Err(StorageError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn memory_backend_roundtrip() -> anyhow::Result<()> {
    exercise_backend(&MemoryStorage::new()).await
}

#[tokio::test]
async fn disk_backend_roundtrip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = DiskStorage::new(dir.path())?;
    exercise_backend(&storage).await
}

#[tokio::test]
async fn disk_save_overwrites_atomically() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = DiskStorage::new(dir.path())?;

    let mut session = persisted("s1", None);
    storage.save_session(&session).await?;
    session.phase = SessionPhase::Stopped;
    storage.save_session(&session).await?;

    let loaded = storage.load_session("s1").await?;
    assert_eq!(loaded.phase, SessionPhase::Stopped);

    // No stray tmp files remain after the rename.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("sessions"))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[tokio::test]
async fn disk_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let storage = DiskStorage::new(dir.path())?;
        storage.save_session(&persisted("s1", None)).await?;
    }
    let reopened = DiskStorage::new(dir.path())?;
    assert_eq!(reopened.list_sessions(None).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn disk_skips_corrupt_documents_on_list() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = DiskStorage::new(dir.path())?;
    storage.save_session(&persisted("good", None)).await?;
    std::fs::write(dir.path().join("sessions/bad.json"), b"{ not json")?;

    let sessions = storage.list_sessions(None).await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "good");
    Ok(())
}

#[tokio::test]
async fn disk_sanitizes_hostile_ids() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = DiskStorage::new(dir.path())?;
    let mut session = persisted("s1", None);
    session.id = "../escape".into();
    storage.save_session(&session).await?;

    // The document stays inside the sessions subtree.
    assert!(!dir.path().join("../escape.json").exists());
    assert!(storage.load_session("../escape").await.is_ok());
    Ok(())
}
