// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use cvr_adapters::{
    BuilderRegistry, DesktopNotifyAdapter, HttpBuilderAdapter, NoopContextLookup, SessionPool,
};
use cvr_core::event::ProposedEvent;
use cvr_core::SystemClock;
use cvr_prompts::PromptWorkspace;
use cvr_storage::{load_snapshot, CoreState, EventLog};
use fs2::FileExt;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Notify};
use tracing::info;

use super::{Config, DaemonState, LifecycleError};
use crate::config::DaemonConfig;
use crate::conversation::ConversationFeed;
use crate::fanout::DaemonNotifier;
use crate::listener::ListenCtx;
use crate::notifier::{load_read_marks, Notifier};
use crate::orchestrator::Orchestrator;

/// Result of daemon startup: state plus the pieces the caller spawns.
pub struct StartupResult {
    pub daemon: DaemonState,
    /// The tool-surface socket, to be wrapped in a Listener task
    pub listener: UnixListener,
    /// Tool-surface handler context
    pub listen_ctx: Arc<ListenCtx>,
    /// HTTP fan-out listen address (None disables it)
    pub http_addr: Option<String>,
    /// Fan-out handler state
    pub app_state: crate::fanout::AppState,
}

/// Start the daemon.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Leave the lock/socket alone if another daemon owns them.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create the workspace directory tree.
    for dir in [
        config.root.join("state"),
        config.root.join("inbox"),
        config.prompts_dir.clone(),
        config.cache_dir.clone(),
    ] {
        std::fs::create_dir_all(&dir)?;
    }

    // 2. Acquire the lock file FIRST - prevents races. Avoid truncating
    // before the lock is held, which would wipe a running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Load the configuration document (builder registry, listen addrs).
    let daemon_config = DaemonConfig::load(&config.config_path)?;

    // 4. Snapshot + WAL replay.
    let state = match load_snapshot(&config.snapshot_path)? {
        Some(snapshot) => {
            info!(
                seq = snapshot.seq,
                tasks = snapshot.state.tasks.len(),
                "loaded snapshot"
            );
            snapshot.state
        }
        None => {
            info!("no snapshot found, starting with empty state");
            CoreState::default()
        }
    };
    let log = EventLog::open(&config.wal_path, state)?;

    // Overlay persisted inbox read marks (the one derived field not in the
    // event set).
    let marks = load_read_marks(&config.inbox_marks_path);
    if !marks.is_empty() {
        log.apply_read_marks(&marks);
    }

    let snapshot = log.snapshot();
    info!(
        tasks = snapshot.tasks.len(),
        sessions = snapshot.sessions.len(),
        inbox = snapshot.inbox.len(),
        last_seq = snapshot.last_seq,
        "recovered state"
    );

    // 5. Builder registry from config.
    let mut registry = BuilderRegistry::new();
    for builder in &daemon_config.builders {
        registry.register(builder.clone(), Arc::new(HttpBuilderAdapter::new(builder)));
        info!(kind = %builder.kind, endpoint = %builder.endpoint, "registered builder");
    }

    // 6. Observation channel: adapters publish proposed events, the
    // forwarder appends them so the log stays the single writer.
    let (event_tx, event_rx) = mpsc::channel::<ProposedEvent>(256);
    spawn_observation_forwarder(event_rx, log.clone());

    let pool = Arc::new(
        SessionPool::new(registry, event_tx, SystemClock)
            .with_cursor_dir(config.cache_dir.join("cursors")),
    );

    // 7. Core components.
    let prompts = Arc::new(PromptWorkspace::new(config.prompts_dir.clone()));
    let orchestrator = Orchestrator::new(log.clone(), prompts, Arc::clone(&pool));
    let notifier: Arc<DaemonNotifier> = Arc::new(Notifier::new(
        log.clone(),
        DesktopNotifyAdapter::new(),
        daemon_config.coalesce_window_ms,
        config.inbox_marks_path.clone(),
    ));
    Arc::clone(&notifier).spawn();
    let conversation = Arc::new(ConversationFeed::new());

    // 8. Remove a stale socket and bind LAST, after all validation passes.
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    // 9. Reconcile live sessions in the background so the daemon is
    // immediately responsive.
    {
        let pool = Arc::clone(&pool);
        let log = log.clone();
        let cursor_dir = config.cache_dir.join("cursors");
        tokio::spawn(async move {
            super::reconcile_state(&pool, &log, &cursor_dir).await;
        });
    }

    let shutdown = Arc::new(Notify::new());
    let start_time = Instant::now();

    let listen_ctx = Arc::new(ListenCtx {
        orchestrator: orchestrator.clone(),
        notifier: Arc::clone(&notifier),
        conversation: Arc::clone(&conversation),
        context: Arc::new(NoopContextLookup),
        shutdown: Arc::clone(&shutdown),
        start_time,
    });

    let app_state = crate::fanout::AppState {
        log: log.clone(),
        orchestrator: orchestrator.clone(),
        notifier: Arc::clone(&notifier),
        conversation: Arc::clone(&conversation),
        start_time,
    };

    info!("daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            log,
            orchestrator,
            notifier,
            pool,
            conversation,
            shutdown,
            start_time,
        },
        listener,
        listen_ctx,
        http_addr: daemon_config.http_addr,
        app_state,
    })
}

/// Forward adapter observations into the event log.
///
/// Conflict rejections are expected here (a late observation after a task
/// went terminal) and are logged at debug, never fatal.
fn spawn_observation_forwarder(mut rx: mpsc::Receiver<ProposedEvent>, log: EventLog) {
    tokio::spawn(async move {
        while let Some(proposed) = rx.recv().await {
            match log.append(proposed) {
                Ok(_) => {}
                Err(cvr_storage::AppendError::Conflict(reason)) => {
                    tracing::debug!(%reason, "dropping late builder observation");
                }
                Err(cvr_storage::AppendError::Duplicate { seq }) => {
                    tracing::debug!(seq, "duplicate builder observation");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to append builder observation");
                }
            }
        }
    });
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}
