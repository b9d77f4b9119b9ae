// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OrbitMesh: multi-agent session orchestration with streaming fan-out.

pub mod agent;
pub mod breaker;
pub mod broadcast;
pub mod config;
pub mod dock;
pub mod error;
pub mod event;
pub mod realtime;
pub mod ring;
pub mod sanitize;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod terminal;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::agent::AdapterRegistry;
use crate::broadcast::EventBroadcaster;
use crate::config::Config;
use crate::session::SessionExecutor;
use crate::snapshot::SnapshotManager;
use crate::state::MeshState;
use crate::storage::{DiskStorage, MemoryStorage, Storage};

/// Build the shared state for a server instance.
///
/// Factored out of [`run`] so tests can assemble the full stack without
/// binding a socket.
pub fn build_state(
    config: Config,
    registry: AdapterRegistry,
    shutdown: CancellationToken,
) -> anyhow::Result<Arc<MeshState>> {
    let storage: Arc<dyn Storage> = match config.data_dir.as_ref() {
        Some(dir) => Arc::new(DiskStorage::new(dir)?),
        None => Arc::new(MemoryStorage::new()),
    };
    let broadcaster =
        Arc::new(EventBroadcaster::new(config.session_replay, config.global_replay));
    let snapshots = SnapshotManager::new(Arc::clone(&storage), config.snapshot_interval());
    let executor =
        SessionExecutor::new(registry, broadcaster, storage, snapshots, config.executor_limits());
    Ok(Arc::new(MeshState::new(executor, config, shutdown)?))
}

/// Run the orbitmesh server until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let shutdown_grace = config.shutdown_grace();

    let state = build_state(config, AdapterRegistry::with_builtin(), shutdown.clone())?;
    state.executor.restore_persisted().await;

    // Ctrl-C triggers the same graceful path as an API-driven shutdown.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    let executor = Arc::clone(&state.executor);
    let router = transport::build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("orbitmesh listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    executor.shutdown(shutdown_grace).await;
    Ok(())
}
