// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::session::executor::ExecutorLimits;

/// Configuration for the orbitmesh service.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "orbitmesh", version, about = "Multi-agent session orchestration service.")]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, default_value = "127.0.0.1", env = "ORBITMESH_HOST")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, default_value_t = 7070, env = "ORBITMESH_PORT")]
    pub port: u16,

    /// Base directory for on-disk persistence. Unset runs fully in memory.
    #[arg(long, env = "ORBITMESH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Auto-snapshot interval in seconds (0 disables).
    #[arg(long, default_value_t = 300, env = "ORBITMESH_SNAPSHOT_INTERVAL")]
    pub snapshot_interval_secs: u64,

    /// Graceful stop budget per session before kill escalation, in seconds.
    #[arg(long, default_value_t = 5, env = "ORBITMESH_STOP_GRACE")]
    pub stop_grace_secs: u64,

    /// Crash restarts allowed within the restart window.
    #[arg(long, default_value_t = 3, env = "ORBITMESH_RESTART_MAX")]
    pub restart_max: usize,

    /// Crash restart window in seconds.
    #[arg(long, default_value_t = 60, env = "ORBITMESH_RESTART_WINDOW")]
    pub restart_window_secs: u64,

    /// Adapter start/stop failures that open the provider breaker.
    #[arg(long, default_value_t = 3, env = "ORBITMESH_BREAKER_THRESHOLD")]
    pub breaker_threshold: usize,

    /// Breaker failure window in seconds.
    #[arg(long, default_value_t = 30, env = "ORBITMESH_BREAKER_WINDOW")]
    pub breaker_window_secs: u64,

    /// Breaker cooldown in seconds once open.
    #[arg(long, default_value_t = 30, env = "ORBITMESH_BREAKER_COOLDOWN")]
    pub breaker_cooldown_secs: u64,

    /// Per-subscriber event queue capacity.
    #[arg(long, default_value_t = 256, env = "ORBITMESH_SUBSCRIBER_BUFFER")]
    pub subscriber_buffer: usize,

    /// Replay log length retained per session.
    #[arg(long, default_value_t = 1024, env = "ORBITMESH_SESSION_REPLAY")]
    pub session_replay: usize,

    /// Replay log length retained for the global state stream.
    #[arg(long, default_value_t = 4096, env = "ORBITMESH_GLOBAL_REPLAY")]
    pub global_replay: usize,

    /// Dock request timeout in seconds.
    #[arg(long, default_value_t = 30, env = "ORBITMESH_DOCK_TIMEOUT")]
    pub dock_timeout_secs: u64,

    /// Budget for stopping all sessions at shutdown, in seconds.
    #[arg(long, default_value_t = 15, env = "ORBITMESH_SHUTDOWN_GRACE")]
    pub shutdown_grace_secs: u64,

    /// SSE heartbeat interval in seconds.
    #[arg(long, default_value_t = 15, env = "ORBITMESH_HEARTBEAT")]
    pub heartbeat_secs: u64,

    /// Disable CSRF double-submit checks (local tooling only).
    #[arg(long, env = "ORBITMESH_CSRF_DISABLED")]
    pub csrf_disabled: bool,

    /// Log format (json or text).
    #[arg(long, default_value = "json", env = "ORBITMESH_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "ORBITMESH_LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn executor_limits(&self) -> ExecutorLimits {
        ExecutorLimits {
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            restart_max: self.restart_max,
            restart_window: Duration::from_secs(self.restart_window_secs),
            breaker_threshold: self.breaker_threshold,
            breaker_window: Duration::from_secs(self.breaker_window_secs),
            breaker_cooldown: Duration::from_secs(self.breaker_cooldown_secs),
            subscriber_buffer: self.subscriber_buffer,
            dock_timeout: Duration::from_secs(self.dock_timeout_secs),
        }
    }

    /// Defaults with an ephemeral store, used by tests.
    pub fn for_tests() -> Self {
        use clap::Parser;
        Self::parse_from(["orbitmesh", "--csrf-disabled", "--log-format", "text"])
    }

    pub fn with_dock_timeout(mut self, secs: u64) -> Self {
        self.dock_timeout_secs = secs;
        self
    }
}
