// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::sanitize::Sanitizer;
use crate::session::SessionExecutor;

/// Shared service state passed to all handlers via axum `State`.
pub struct MeshState {
    pub executor: Arc<SessionExecutor>,
    pub config: Config,
    pub shutdown: CancellationToken,
    pub sanitizer: Sanitizer,
}

impl MeshState {
    pub fn new(
        executor: Arc<SessionExecutor>,
        config: Config,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        Ok(Self { executor, config, shutdown, sanitizer: Sanitizer::new()? })
    }
}

impl std::fmt::Debug for MeshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshState").field("host", &self.config.host).finish()
    }
}
