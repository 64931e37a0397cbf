// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live builder session pool.
//!
//! Owns every in-flight remote session: enforces at most one per task,
//! dispatch idempotency by token, gate suspension of user input, bounded
//! abort confirmation, and the stream consumers that convert remote events
//! into proposed domain events. Consumers publish through the event
//! channel only; derived state is never touched here.

use crate::builder::{
    BuilderAdapter, BuilderError, BuilderLimits, BuilderRegistry, BuilderTimeouts,
    CreateSessionRequest, RemoteEvent, SessionHealth, StreamFrame,
};
use cvr_core::clock::Clock;
use cvr_core::event::{EventBody, EventRefs, ProposedEvent};
use cvr_core::handoff::GateKind;
use cvr_core::id::{TaskId, TopicSlug};
use cvr_core::session::{ArtifactPointer, SessionId, SessionStatus};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Abort retry attempts (write-effecting, so a small fixed count).
const ABORT_RETRIES: u32 = 3;
/// Initial stream reconnect backoff; doubles up to the cap.
const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Errors from pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("unknown builder kind: {0}")]
    UnknownKind(String),
    #[error("builder at session capacity")]
    AtCapacity,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// Inputs for a dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub task_id: TaskId,
    pub topic: TopicSlug,
    pub builder_kind: String,
    pub handoff_md_path: PathBuf,
    pub handoff_json_path: PathBuf,
    pub handoff_digest: String,
}

/// Result of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub session_id: SessionId,
    /// True when an identical dispatch token matched an in-flight session
    /// and nothing new was created or emitted.
    pub reused: bool,
}

/// Result of an abort attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    /// The stream confirmed the remote abort within the bounded wait.
    Confirmed,
    /// Timed out waiting; the local session is marked aborted regardless.
    Unconfirmed,
}

/// Mutable per-session state shared with the stream consumer.
struct SessionShared {
    /// A gate is pending; user inputs are held until resolution.
    gate_pending: bool,
    held_inputs: Vec<String>,
    /// Abort intent set; the consumer stops publishing task-status events
    /// and signals the terminal watch instead.
    aborting: bool,
}

struct LiveSession {
    session_id: SessionId,
    builder_kind: String,
    dispatch_token: String,
    cancel: CancellationToken,
    shared: Arc<Mutex<SessionShared>>,
    /// Flips to true when the consumer observes a terminal frame.
    terminal_rx: watch::Receiver<bool>,
}

/// The deterministic dispatch idempotency token.
pub fn dispatch_token(task_id: &TaskId, handoff_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(handoff_digest.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Read a persisted stream cursor (non-authoritative cache; absence means
/// resume from the beginning).
pub fn load_cursor(cursor_dir: &std::path::Path, session_id: &SessionId) -> u64 {
    std::fs::read_to_string(cursor_dir.join(format!("{}.cursor", session_id)))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Pool of live builder sessions.
pub struct SessionPool<C: Clock> {
    registry: BuilderRegistry,
    event_tx: mpsc::Sender<ProposedEvent>,
    clock: C,
    sessions: Arc<Mutex<HashMap<TaskId, LiveSession>>>,
    /// Where stream cursors are cached for resume-after-restart.
    cursor_dir: Option<PathBuf>,
}

impl<C: Clock + 'static> SessionPool<C> {
    pub fn new(registry: BuilderRegistry, event_tx: mpsc::Sender<ProposedEvent>, clock: C) -> Self {
        Self {
            registry,
            event_tx,
            clock,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            cursor_dir: None,
        }
    }

    /// Persist stream cursors under `dir` (a cache; safe to delete).
    pub fn with_cursor_dir(mut self, dir: PathBuf) -> Self {
        let _ = std::fs::create_dir_all(&dir);
        self.cursor_dir = Some(dir);
        self
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Count of live sessions against one builder kind.
    pub fn live_count(&self, kind: &str) -> usize {
        self.sessions.lock().values().filter(|s| s.builder_kind == kind).count()
    }

    /// The live session id for a task, if any.
    pub fn session_for(&self, task_id: &TaskId) -> Option<SessionId> {
        self.sessions.lock().get(task_id).map(|s| s.session_id.clone())
    }

    /// Whether a dispatch would be admitted right now (quick-dispatch
    /// admission check; the real dispatch re-validates).
    pub fn can_admit(&self, kind: &str) -> bool {
        match self.registry.get(kind) {
            Some(b) => self.live_count(kind) < b.config.limits.max_sessions,
            None => false,
        }
    }

    /// Dispatch a frozen handoff to a builder.
    ///
    /// Creates the remote session, emits `BuilderDispatched`, sends the
    /// pointer-first handoff message, and starts the stream consumer.
    /// Idempotent by dispatch token; a differing token against an in-flight
    /// session is a conflict and emits nothing.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, PoolError> {
        let token = dispatch_token(&request.task_id, &request.handoff_digest);

        if let Some(existing) = self.check_existing(&request.task_id, &token)? {
            return Ok(existing);
        }

        let registered = self
            .registry
            .get(&request.builder_kind)
            .ok_or_else(|| PoolError::UnknownKind(request.builder_kind.clone()))?
            .clone();
        if self.live_count(&request.builder_kind) >= registered.config.limits.max_sessions {
            return Err(PoolError::AtCapacity);
        }

        let create = CreateSessionRequest {
            task_id: request.task_id,
            topic: request.topic.clone(),
            handoff_md_path: request.handoff_md_path.clone(),
            handoff_json_path: request.handoff_json_path.clone(),
            handoff_digest: request.handoff_digest.clone(),
            default_model: registered.config.default_model.clone(),
        };
        let session_id = registered.adapter.create_session(&create).await?;

        // Re-check under the lock: a concurrent dispatch may have won.
        if let Some(existing) = self.check_existing(&request.task_id, &token)? {
            let adapter = Arc::clone(&registered.adapter);
            let orphan = session_id.clone();
            tokio::spawn(async move {
                let _ = adapter.abort(&orphan).await;
            });
            return Ok(existing);
        }

        self.publish(
            ProposedEvent::new(
                request.task_id,
                EventBody::BuilderDispatched {
                    builder_kind: request.builder_kind.clone(),
                    session_id: session_id.clone(),
                    dispatch_token: token.clone(),
                },
            )
            .with_refs(EventRefs {
                session_id: Some(session_id.clone()),
                ..EventRefs::default()
            }),
        )
        .await;

        self.start_consumer(
            request.task_id,
            session_id.clone(),
            request.builder_kind.clone(),
            token,
            Arc::clone(&registered.adapter),
            registered.config.timeouts.clone(),
            registered.config.limits.clone(),
            0,
        );

        // Pointer-first handoff message: paths and digest, not contents.
        let handoff_msg = serde_json::json!({
            "type": "handoff",
            "handoff_md": request.handoff_md_path,
            "handoff_json": request.handoff_json_path,
            "digest": request.handoff_digest,
        });
        if let Err(e) =
            send_with_retry(registered.adapter.as_ref(), &session_id, &handoff_msg.to_string())
                .await
        {
            // Undo the half-dispatch: tear the session down locally, ask
            // the remote to abort, and fail the task.
            if let Some(live) = self.sessions.lock().remove(&request.task_id) {
                live.cancel.cancel();
            }
            let adapter = Arc::clone(&registered.adapter);
            let orphan = session_id.clone();
            tokio::spawn(async move {
                let _ = adapter.abort(&orphan).await;
            });
            self.publish(
                ProposedEvent::new(
                    request.task_id,
                    EventBody::BuildFailed { reason: format!("handoff delivery failed: {}", e) },
                )
                .with_refs(EventRefs {
                    session_id: Some(session_id.clone()),
                    ..EventRefs::default()
                }),
            )
            .await;
            return Err(e.into());
        }

        Ok(DispatchOutcome { session_id, reused: false })
    }

    fn check_existing(
        &self,
        task_id: &TaskId,
        token: &str,
    ) -> Result<Option<DispatchOutcome>, PoolError> {
        let sessions = self.sessions.lock();
        match sessions.get(task_id) {
            Some(live) if live.dispatch_token == token => Ok(Some(DispatchOutcome {
                session_id: live.session_id.clone(),
                reused: true,
            })),
            Some(live) => Err(PoolError::Conflict(format!(
                "task {} already has in-flight session {}",
                task_id, live.session_id
            ))),
            None => Ok(None),
        }
    }

    /// Resume monitoring an existing remote session (reconciliation after
    /// restart). No creation, no dispatch event; the stream consumer picks
    /// up from `cursor`.
    pub fn resume(
        &self,
        task_id: TaskId,
        session_id: SessionId,
        builder_kind: &str,
        dispatch_token: String,
        cursor: u64,
    ) -> Result<(), PoolError> {
        let registered = self
            .registry
            .get(builder_kind)
            .ok_or_else(|| PoolError::UnknownKind(builder_kind.to_string()))?
            .clone();
        self.start_consumer(
            task_id,
            session_id,
            builder_kind.to_string(),
            dispatch_token,
            Arc::clone(&registered.adapter),
            registered.config.timeouts.clone(),
            registered.config.limits.clone(),
            cursor,
        );
        Ok(())
    }

    /// Remote session health for reconciliation.
    pub async fn health(
        &self,
        builder_kind: &str,
        session_id: &SessionId,
    ) -> Result<SessionHealth, PoolError> {
        let registered = self
            .registry
            .get(builder_kind)
            .ok_or_else(|| PoolError::UnknownKind(builder_kind.to_string()))?;
        Ok(registered.adapter.health(session_id).await?)
    }

    /// Send user input into a task's live session. Held while a gate is
    /// pending and flushed on resolution.
    pub async fn send_user_input(&self, task_id: &TaskId, content: &str) -> Result<(), PoolError> {
        let (adapter, session_id) = {
            let sessions = self.sessions.lock();
            let live = sessions
                .get(task_id)
                .ok_or_else(|| PoolError::Conflict(format!("no live session for {}", task_id)))?;
            let mut shared = live.shared.lock();
            if shared.gate_pending {
                shared.held_inputs.push(content.to_string());
                return Ok(());
            }
            (self.adapter_for(&live.builder_kind)?, live.session_id.clone())
        };
        send_with_retry(adapter.as_ref(), &session_id, content).await?;
        Ok(())
    }

    /// Forward a gate resolution to the remote and release held inputs.
    pub async fn resolve_gate(
        &self,
        task_id: &TaskId,
        gate: GateKind,
        approve: bool,
    ) -> Result<(), PoolError> {
        let (adapter, session_id, held) = {
            let sessions = self.sessions.lock();
            let live = sessions
                .get(task_id)
                .ok_or_else(|| PoolError::Conflict(format!("no live session for {}", task_id)))?;
            let mut shared = live.shared.lock();
            shared.gate_pending = false;
            let held = std::mem::take(&mut shared.held_inputs);
            (self.adapter_for(&live.builder_kind)?, live.session_id.clone(), held)
        };

        let resolution = serde_json::json!({
            "type": "gate_resolution",
            "kind": gate.to_string(),
            "decision": if approve { "approved" } else { "denied" },
        });
        send_with_retry(adapter.as_ref(), &session_id, &resolution.to_string()).await?;

        for input in held {
            send_with_retry(adapter.as_ref(), &session_id, &input).await?;
        }
        Ok(())
    }

    /// Abort a task's live session: set intent, call the remote abort
    /// endpoint (small fixed retry count), and wait a bounded interval for
    /// the stream to confirm. On timeout the session is torn down locally
    /// regardless and `Unconfirmed` is returned.
    pub async fn abort(&self, task_id: &TaskId) -> AbortOutcome {
        let (adapter, session_id, mut terminal_rx, confirm_window, cancel) = {
            let sessions = self.sessions.lock();
            let Some(live) = sessions.get(task_id) else {
                // Nothing in flight: trivially confirmed.
                return AbortOutcome::Confirmed;
            };
            live.shared.lock().aborting = true;
            let adapter = match self.adapter_for(&live.builder_kind) {
                Ok(a) => a,
                Err(_) => return AbortOutcome::Unconfirmed,
            };
            let timeouts = self
                .registry
                .get(&live.builder_kind)
                .map(|b| b.config.timeouts.abort_confirm())
                .unwrap_or(Duration::from_secs(10));
            (
                adapter,
                live.session_id.clone(),
                live.terminal_rx.clone(),
                timeouts,
                live.cancel.clone(),
            )
        };

        for attempt in 0..ABORT_RETRIES {
            match adapter.abort(&session_id).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt + 1 < ABORT_RETRIES => {
                    tokio::time::sleep(Duration::from_millis(250 * (attempt as u64 + 1))).await;
                }
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "remote abort failed");
                    break;
                }
            }
        }

        let confirmed = tokio::time::timeout(confirm_window, async {
            while !*terminal_rx.borrow() {
                if terminal_rx.changed().await.is_err() {
                    return false;
                }
            }
            true
        })
        .await
        .unwrap_or(false);

        // Tear down locally either way.
        cancel.cancel();
        self.sessions.lock().remove(task_id);

        if confirmed {
            AbortOutcome::Confirmed
        } else {
            AbortOutcome::Unconfirmed
        }
    }

    fn adapter_for(&self, kind: &str) -> Result<Arc<dyn BuilderAdapter>, PoolError> {
        self.registry
            .get(kind)
            .map(|b| Arc::clone(&b.adapter))
            .ok_or_else(|| PoolError::UnknownKind(kind.to_string()))
    }

    async fn publish(&self, event: ProposedEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::error!("event channel closed; dropping builder observation");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn start_consumer(
        &self,
        task_id: TaskId,
        session_id: SessionId,
        builder_kind: String,
        dispatch_token: String,
        adapter: Arc<dyn BuilderAdapter>,
        timeouts: BuilderTimeouts,
        limits: BuilderLimits,
        cursor: u64,
    ) {
        let cancel = CancellationToken::new();
        let shared = Arc::new(Mutex::new(SessionShared {
            gate_pending: false,
            held_inputs: Vec::new(),
            aborting: false,
        }));
        let (terminal_tx, terminal_rx) = watch::channel(false);

        self.sessions.lock().insert(
            task_id,
            LiveSession {
                session_id: session_id.clone(),
                builder_kind,
                dispatch_token,
                cancel: cancel.clone(),
                shared: Arc::clone(&shared),
                terminal_rx,
            },
        );

        let consumer = StreamConsumer {
            task_id,
            session_id,
            adapter,
            event_tx: self.event_tx.clone(),
            sessions: Arc::clone(&self.sessions),
            shared,
            terminal_tx,
            cancel,
            timeouts,
            limits,
            cursor_dir: self.cursor_dir.clone(),
            now_ms: {
                let clock = self.clock.clone();
                Arc::new(move || clock.epoch_ms())
            },
        };
        tokio::spawn(consumer.run(cursor));
    }
}

/// Per-session stream consumer: reads frames, reconnects with backoff,
/// translates to domain events.
struct StreamConsumer {
    task_id: TaskId,
    session_id: SessionId,
    adapter: Arc<dyn BuilderAdapter>,
    event_tx: mpsc::Sender<ProposedEvent>,
    sessions: Arc<Mutex<HashMap<TaskId, LiveSession>>>,
    shared: Arc<Mutex<SessionShared>>,
    terminal_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    timeouts: BuilderTimeouts,
    limits: BuilderLimits,
    cursor_dir: Option<PathBuf>,
    now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
}

enum FrameOutcome {
    Continue,
    Terminal,
}

impl StreamConsumer {
    async fn run(self, mut cursor: u64) {
        let mut backoff = BACKOFF_INITIAL;
        let mut reconnects: Vec<Instant> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                self.teardown();
                return;
            }

            match self
                .adapter
                .stream_events(&self.session_id, cursor, self.cancel.clone())
                .await
            {
                Ok(mut rx) => {
                    backoff = BACKOFF_INITIAL;
                    loop {
                        let frame =
                            tokio::time::timeout(self.timeouts.stream_idle(), rx.recv()).await;
                        match frame {
                            Ok(Some(frame)) => {
                                cursor = frame.cursor;
                                self.persist_cursor(cursor);
                                if let FrameOutcome::Terminal = self.handle_frame(frame).await {
                                    self.teardown();
                                    return;
                                }
                            }
                            Ok(None) => {
                                if self.cancel.is_cancelled() {
                                    self.teardown();
                                    return;
                                }
                                tracing::debug!(session = %self.session_id, "builder stream closed, reconnecting");
                                break;
                            }
                            Err(_) => {
                                // Idle timeout is a reconnect, not a failure.
                                tracing::debug!(session = %self.session_id, "builder stream idle, reconnecting");
                                break;
                            }
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(session = %self.session_id, error = %e, "stream connect failed, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
                Err(e) => {
                    self.escalate_lost(format!("stream rejected: {}", e)).await;
                    return;
                }
            }

            let window = Duration::from_secs(self.limits.reconnect_window_s);
            reconnects.retain(|t| t.elapsed() < window);
            reconnects.push(Instant::now());
            if reconnects.len() > self.limits.max_reconnects as usize {
                self.escalate_lost("reconnect cap exceeded".into()).await;
                return;
            }
        }
    }

    async fn handle_frame(&self, frame: StreamFrame) -> FrameOutcome {
        let aborting = self.shared.lock().aborting;
        match frame.event {
            RemoteEvent::Status { status, reason } => {
                let mapped = map_status(&status);
                let terminal = mapped.is_terminal();
                if aborting {
                    if terminal {
                        let _ = self.terminal_tx.send(true);
                        return FrameOutcome::Terminal;
                    }
                    return FrameOutcome::Continue;
                }
                self.publish(EventBody::BuilderStatusChanged { status: mapped, reason })
                    .await;
                if terminal {
                    let _ = self.terminal_tx.send(true);
                    return FrameOutcome::Terminal;
                }
                FrameOutcome::Continue
            }

            RemoteEvent::Gate { kind, detail } => {
                let Some(gate) = GateKind::parse(&kind) else {
                    tracing::warn!(session = %self.session_id, kind, "dropping gate with unknown kind");
                    return FrameOutcome::Continue;
                };
                self.shared.lock().gate_pending = true;
                if !aborting {
                    self.publish(EventBody::GateRequested { gate, detail }).await;
                }
                FrameOutcome::Continue
            }

            RemoteEvent::Completed { artifacts } => {
                let _ = self.terminal_tx.send(true);
                if !aborting {
                    let now = (self.now_ms)();
                    let artifacts = artifacts
                        .into_iter()
                        .map(|a| ArtifactPointer {
                            kind: if a.kind.is_empty() { "artifact".into() } else { a.kind },
                            path: a.path,
                            created_at_ms: now,
                        })
                        .collect();
                    self.publish(EventBody::BuildCompleted { artifacts }).await;
                }
                FrameOutcome::Terminal
            }

            RemoteEvent::Failed { reason } => {
                let _ = self.terminal_tx.send(true);
                if !aborting {
                    self.publish(EventBody::BuildFailed { reason }).await;
                }
                FrameOutcome::Terminal
            }
        }
    }

    async fn escalate_lost(&self, reason: String) {
        let aborting = self.shared.lock().aborting;
        let _ = self.terminal_tx.send(true);
        if !aborting {
            self.publish(EventBody::BuilderStatusChanged {
                status: SessionStatus::Lost,
                reason: Some(reason),
            })
            .await;
            self.publish(EventBody::BuildFailed { reason: "remote_unavailable".into() })
                .await;
        }
        self.teardown();
    }

    fn persist_cursor(&self, cursor: u64) {
        if let Some(dir) = &self.cursor_dir {
            let path = dir.join(format!("{}.cursor", self.session_id));
            if let Err(e) = std::fs::write(&path, cursor.to_string()) {
                tracing::debug!(path = %path.display(), error = %e, "cursor cache write failed");
            }
        }
    }

    fn teardown(&self) {
        let mut sessions = self.sessions.lock();
        // Only remove the entry if it is still ours (a later dispatch may
        // have replaced it after an abort).
        if sessions.get(&self.task_id).is_some_and(|s| s.session_id == self.session_id) {
            sessions.remove(&self.task_id);
        }
    }

    async fn publish(&self, body: EventBody) {
        let event = ProposedEvent::new(self.task_id, body).with_refs(EventRefs {
            session_id: Some(self.session_id.clone()),
            ..EventRefs::default()
        });
        if self.event_tx.send(event).await.is_err() {
            tracing::error!("event channel closed; dropping builder observation");
        }
    }
}

/// Send with backoff over transient failures, up to a small cap.
async fn send_with_retry(
    adapter: &dyn BuilderAdapter,
    session_id: &SessionId,
    content: &str,
) -> Result<(), BuilderError> {
    let mut backoff = BACKOFF_INITIAL;
    let mut attempt = 0u32;
    loop {
        match adapter.send_message(session_id, content).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < 3 => {
                attempt += 1;
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a remote status string to a session status. Unknown strings map to
/// Running (the conservative non-terminal reading) and are logged.
fn map_status(status: &str) -> SessionStatus {
    match status {
        "created" => SessionStatus::Created,
        "running" | "starting" | "working" => SessionStatus::Running,
        "paused" => SessionStatus::Paused,
        "waiting_permission" => SessionStatus::WaitingPermission,
        "completed" => SessionStatus::Completed,
        "failed" | "error" => SessionStatus::Failed,
        "aborted" => SessionStatus::Aborted,
        other => {
            tracing::debug!(status = other, "unrecognized builder status string");
            SessionStatus::Running
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
