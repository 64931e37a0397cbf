// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

mod reconcile;
mod startup;
pub(crate) use reconcile::reconcile_state;
pub use startup::{startup, StartupResult};

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::conversation::ConversationFeed;
use crate::fanout::DaemonNotifier;
use crate::orchestrator::Orchestrator;
use crate::DaemonPool;
use cvr_storage::{Checkpointer, EventLog};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Daemon path and listen configuration, derived from the workspace root.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace root (state/, inbox/, prompts/, cache/ live under it).
    pub root: PathBuf,
    /// Path to the Unix tool-surface socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to the durable event log
    pub wal_path: PathBuf,
    /// Path to the advisory state snapshot
    pub snapshot_path: PathBuf,
    /// Path to persisted inbox read marks
    pub inbox_marks_path: PathBuf,
    /// Prompt workspace root
    pub prompts_dir: PathBuf,
    /// Non-authoritative caches (stream cursors); safe to delete
    pub cache_dir: PathBuf,
    /// Path to the configuration document
    pub config_path: PathBuf,
    /// Path to the daemon log file
    pub log_path: PathBuf,
}

impl Config {
    /// Resolve paths from the environment-selected workspace root.
    pub fn load() -> Result<Self, LifecycleError> {
        let root = crate::env::workspace_root().ok_or(LifecycleError::NoStateDir)?;
        Ok(Self::at_root(root))
    }

    /// Resolve paths under an explicit root (tests use a tempdir).
    pub fn at_root(root: PathBuf) -> Self {
        let config_path = crate::env::config_path(&root);
        Self {
            socket_path: root.join("state/daemon.sock"),
            lock_path: root.join("state/daemon.pid"),
            wal_path: root.join("state/events.wal"),
            snapshot_path: root.join("state/snapshot.zst"),
            inbox_marks_path: root.join("inbox/marks.json"),
            prompts_dir: root.join("prompts"),
            cache_dir: root.join("cache"),
            log_path: root.join("daemon.log"),
            config_path,
            root,
        }
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub log: EventLog,
    pub orchestrator: Orchestrator,
    pub notifier: Arc<DaemonNotifier>,
    pub pool: Arc<DaemonPool>,
    pub conversation: Arc<ConversationFeed>,
    pub shutdown: Arc<Notify>,
    pub start_time: Instant,
}

impl DaemonState {
    /// Shutdown the daemon gracefully.
    ///
    /// Live builder sessions are intentionally left running on the remote;
    /// the next startup reconciles them. A final snapshot makes the next
    /// boot skip most of the WAL replay.
    pub fn shutdown(&mut self) {
        info!("shutting down daemon...");

        let last_seq = self.log.last_seq();
        if last_seq > 0 {
            let state = self.log.state_clone();
            let checkpointer = Checkpointer::new(self.config.snapshot_path.clone());
            match checkpointer.checkpoint_sync(last_seq, &state) {
                Ok(result) => info!(
                    seq = result.seq,
                    size_bytes = result.size_bytes,
                    "saved final shutdown snapshot"
                ),
                Err(e) => warn!("failed to save shutdown snapshot: {}", e),
            }
        }

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("failed to remove socket file: {}", e);
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("failed to remove PID file: {}", e);
            }
        }

        info!("daemon shutdown complete");
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine workspace root")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("WAL error: {0}")]
    Wal(#[from] cvr_storage::WalError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] cvr_storage::SnapshotError),

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
