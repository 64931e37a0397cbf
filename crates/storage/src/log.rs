// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event log facade: single-writer append with validation, consistent
//! snapshots, and gap-free live subscriptions.
//!
//! Every state mutation in the system funnels through [`EventLog::append`]:
//! validate against current derived state, assign the next seq, persist,
//! apply, publish. Readers take [`snapshot`](EventLog::snapshot) views or
//! [`subscribe`](EventLog::subscribe) from a seq of their choosing.

use crate::state::CoreState;
use crate::wal::{Wal, WalError};
use chrono::{DateTime, Utc};
use cvr_core::event::{Event, EventBody, ProposedEvent};
use cvr_core::id::InboxId;
use cvr_core::inbox::InboxItem;
use cvr_core::session::BuilderSession;
use cvr_core::task::Task;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Broadcast channel depth for live tailing. A subscriber that lags past
/// this many events recovers by re-reading the WAL, so nothing is lost.
const BROADCAST_DEPTH: usize = 256;

/// Appends waiting on the writer lock beyond this are rejected with `Busy`.
const PENDING_HIGH_WATER: usize = 512;

/// Consecutive storage failures before the log turns read-only.
const DEGRADE_AFTER: u32 = 3;

/// Errors from the append path.
#[derive(Debug, Error)]
pub enum AppendError {
    /// Caller referenced unknown state (task id, malformed proposal).
    /// Surfaced to the caller; nothing was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The proposal conflicts with current state (invalid transition,
    /// double freeze, differing duplicate dispatch). Not retryable without
    /// re-reading state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Idempotency key already used; the original event is at `seq`.
    /// Retryable as a no-op.
    #[error("duplicate of seq {seq}")]
    Duplicate { seq: u64 },

    /// Append queue above the high-water mark; retry later.
    #[error("event log busy")]
    Busy,

    /// The log is in degraded read-only mode after repeated storage
    /// failures; operator intervention required.
    #[error("event log is read-only (degraded)")]
    ReadOnly,

    #[error("storage error: {0}")]
    Storage(#[from] WalError),
}

/// Consistent point-in-time view of derived state.
#[derive(Debug, Clone)]
pub struct StateView {
    pub tasks: HashMap<cvr_core::id::TaskId, Task>,
    pub sessions: HashMap<cvr_core::session::SessionId, BuilderSession>,
    pub topics: HashMap<String, crate::state::TopicRecord>,
    pub inbox: Vec<InboxItem>,
    pub last_seq: u64,
}

struct LogInner {
    wal: Wal,
    state: CoreState,
}

/// Durable, ordered event log with derived state. Cheap to clone.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Mutex<LogInner>>,
    tx: broadcast::Sender<Event>,
    pending: Arc<AtomicUsize>,
    degraded: Arc<AtomicBool>,
    io_failures: Arc<AtomicUsize>,
}

impl EventLog {
    /// Open the log, replaying durable entries newer than `state` into it.
    ///
    /// `state` is normally a snapshot (or `CoreState::default()`); replay
    /// brings it up to the WAL head.
    pub fn open(path: &Path, mut state: CoreState) -> Result<Self, WalError> {
        let mut wal = Wal::open(path, state.last_seq)?;
        let replay = wal.entries_after(state.last_seq)?;
        let replay_count = replay.len();
        for event in &replay {
            state.apply_event(event);
        }
        wal.mark_processed(state.last_seq);
        if replay_count > 0 {
            tracing::info!(replay_count, last_seq = state.last_seq, "replayed WAL entries");
        }

        let (tx, _) = broadcast::channel(BROADCAST_DEPTH);
        Ok(Self {
            inner: Arc::new(Mutex::new(LogInner { wal, state })),
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
            degraded: Arc::new(AtomicBool::new(false)),
            io_failures: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Validate, persist, apply, and publish one event.
    ///
    /// On success the returned event carries its assigned seq. Any failure
    /// leaves the log unchanged.
    pub fn append(&self, proposed: ProposedEvent) -> Result<Event, AppendError> {
        self.append_at(proposed, Utc::now())
    }

    /// [`append`](Self::append) with an explicit timestamp (testing and
    /// deterministic replay tooling).
    pub fn append_at(
        &self,
        proposed: ProposedEvent,
        time: DateTime<Utc>,
    ) -> Result<Event, AppendError> {
        if self.degraded.load(Ordering::Acquire) {
            return Err(AppendError::ReadOnly);
        }
        if self.pending.fetch_add(1, Ordering::AcqRel) >= PENDING_HIGH_WATER {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(AppendError::Busy);
        }

        let result = self.append_locked(proposed, time);
        self.pending.fetch_sub(1, Ordering::AcqRel);
        result
    }

    fn append_locked(
        &self,
        proposed: ProposedEvent,
        time: DateTime<Utc>,
    ) -> Result<Event, AppendError> {
        let mut inner = self.inner.lock();

        validate(&inner.state, &proposed)?;

        let event = inner.wal.append(proposed, time).map_err(|e| self.io_failed(e))?;
        if let Err(e) = inner.wal.flush() {
            return Err(self.io_failed(e));
        }
        self.io_failures.store(0, Ordering::Release);

        inner.state.apply_event(&event);
        let seq = event.seq;
        inner.wal.mark_processed(seq);
        drop(inner);

        // No receivers is fine; subscribers catch up from the WAL.
        let _ = self.tx.send(event.clone());
        Ok(event)
    }

    fn io_failed(&self, e: WalError) -> AppendError {
        let failures = self.io_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures as u32 >= DEGRADE_AFTER {
            tracing::error!(failures, "event log entering degraded read-only mode");
            self.degraded.store(true, Ordering::Release);
        }
        AppendError::Storage(e)
    }

    /// True once repeated storage failures have made the log read-only.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Consistent point-in-time view of derived state.
    pub fn snapshot(&self) -> StateView {
        let inner = self.inner.lock();
        StateView {
            tasks: inner.state.tasks.clone(),
            sessions: inner.state.sessions.clone(),
            topics: inner.state.topics.clone(),
            inbox: inner.state.inbox.clone(),
            last_seq: inner.state.last_seq,
        }
    }

    /// Run a closure against the current derived state without cloning.
    pub fn with_state<T>(&self, f: impl FnOnce(&CoreState) -> T) -> T {
        let inner = self.inner.lock();
        f(&inner.state)
    }

    /// Full clone of derived state (checkpointing).
    pub fn state_clone(&self) -> CoreState {
        self.inner.lock().state.clone()
    }

    /// Seq of the most recently appended event.
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().state.last_seq
    }

    /// Subscribe from `from_seq` (exclusive): replays every durable event
    /// after it, then tails live appends, in order, without gaps or
    /// duplicates. Reconnecting with the last seen seq resumes exactly.
    pub fn subscribe(&self, from_seq: u64) -> Subscription {
        // Catch-up and channel registration under the writer lock: no event
        // can land between the WAL read and the subscription.
        let mut inner = self.inner.lock();
        let backlog = inner.wal.entries_after(from_seq).unwrap_or_default();
        let rx = self.tx.subscribe();
        drop(inner);

        Subscription {
            log: self.clone(),
            backlog: backlog.into(),
            rx,
            last_seq: from_seq,
        }
    }

    /// Mark inbox items read. Returns the ids actually acknowledged.
    ///
    /// Read marks are the one piece of state outside the event set; the
    /// daemon persists them separately for fast boot.
    pub fn acknowledge_inbox(&self, ids: &[InboxId], now_ms: u64) -> Vec<InboxId> {
        let mut inner = self.inner.lock();
        let mut acked = Vec::new();
        for item in inner.state.inbox.iter_mut() {
            if item.read_at_ms.is_none() && ids.contains(&item.id) {
                item.read_at_ms = Some(now_ms);
                acked.push(item.id);
            }
        }
        acked
    }

    /// Overlay persisted read marks after boot replay.
    pub fn apply_read_marks(&self, marks: &HashMap<String, u64>) {
        let mut inner = self.inner.lock();
        for item in inner.state.inbox.iter_mut() {
            if item.read_at_ms.is_none() {
                if let Some(ms) = marks.get(item.id.as_str()) {
                    item.read_at_ms = Some(*ms);
                }
            }
        }
    }
}

/// Validate a proposal against current derived state.
fn validate(state: &CoreState, proposed: &ProposedEvent) -> Result<(), AppendError> {
    // Idempotency key replay short-circuits before any other check.
    if let Some(command_id) = proposed.refs.as_ref().and_then(|r| r.command_id.as_ref()) {
        if let Some(record) = state.command_outcome(command_id) {
            return Err(AppendError::Duplicate { seq: record.seq });
        }
    }

    match &proposed.body {
        EventBody::TaskCreated { topic, .. } => {
            let Some(task_id) = proposed.task_id else {
                return Err(AppendError::Validation("TaskCreated requires a task id".into()));
            };
            if state.tasks.contains_key(&task_id) {
                return Err(AppendError::Conflict(format!("task {} already exists", task_id)));
            }
            if state.topics.get(topic.as_str()).is_some_and(|t| t.is_frozen()) {
                return Err(AppendError::Conflict(format!(
                    "topic {} is already frozen",
                    topic
                )));
            }
            Ok(())
        }

        body => {
            let Some(task_id) = proposed.task_id else {
                return Err(AppendError::Validation(format!(
                    "{} requires a task id",
                    body.type_str()
                )));
            };
            let Some(task) = state.tasks.get(&task_id) else {
                return Err(AppendError::Validation(format!("unknown task {}", task_id)));
            };

            // Body-specific idempotency and uniqueness checks run before the
            // transition table so a benign duplicate reads as Duplicate, not
            // as an invalid transition.
            match body {
                EventBody::HandoffFrozen { topic, .. } => {
                    if let Some(frozen) =
                        state.topics.get(topic.as_str()).and_then(|r| r.frozen.as_ref())
                    {
                        return Err(AppendError::Duplicate { seq: frozen.seq });
                    }
                }

                EventBody::ExternalTaskLinked { external_task_id } => {
                    match &task.external_task_id {
                        Some(existing) if existing == external_task_id => {
                            return Err(AppendError::Duplicate { seq: task.last_event_seq });
                        }
                        Some(existing) => {
                            return Err(AppendError::Conflict(format!(
                                "task {} already linked to {}",
                                task_id, existing
                            )));
                        }
                        None => {}
                    }
                }

                EventBody::BuilderDispatched { dispatch_token, .. } => {
                    if let Some(live) = state.live_session_for(&task_id) {
                        if live.dispatch_token == *dispatch_token {
                            return Err(AppendError::Duplicate { seq: task.last_event_seq });
                        }
                        return Err(AppendError::Conflict(format!(
                            "task {} already has in-flight session {}",
                            task_id, live.id
                        )));
                    }
                }

                _ => {}
            }

            // Transition check per the authoritative table.
            task.status
                .apply(body)
                .map_err(|e| AppendError::Conflict(e.to_string()))?;

            Ok(())
        }
    }
}

/// A gap-free, duplicate-free event stream starting at a chosen seq.
///
/// Recovers from broadcast lag by re-reading the WAL, so domain events are
/// never dropped — a lagging subscriber just catches up.
pub struct Subscription {
    log: EventLog,
    backlog: std::collections::VecDeque<Event>,
    rx: broadcast::Receiver<Event>,
    last_seq: u64,
}

impl Subscription {
    /// Seq of the last delivered event.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Next event in seq order. Waits for live appends once the backlog is
    /// drained.
    pub async fn recv(&mut self) -> Event {
        loop {
            if let Some(event) = self.backlog.pop_front() {
                if event.seq <= self.last_seq {
                    continue;
                }
                self.last_seq = event.seq;
                return event;
            }

            match self.rx.recv().await {
                Ok(event) => {
                    if event.seq <= self.last_seq {
                        continue;
                    }
                    if event.seq != self.last_seq + 1 {
                        // Gap (raced a lag window): refill from the WAL.
                        self.refill();
                        continue;
                    }
                    self.last_seq = event.seq;
                    return event;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    self.refill();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // Writer gone; drain whatever the WAL still holds.
                    self.refill();
                    if let Some(event) = self.backlog.pop_front() {
                        self.last_seq = event.seq;
                        return event;
                    }
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    /// Non-blocking variant: `None` when no newer event is available yet.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.backlog.pop_front() {
                if event.seq <= self.last_seq {
                    continue;
                }
                self.last_seq = event.seq;
                return Some(event);
            }
            match self.rx.try_recv() {
                Ok(event) => {
                    if event.seq <= self.last_seq {
                        continue;
                    }
                    if event.seq != self.last_seq + 1 {
                        self.refill();
                        continue;
                    }
                    self.last_seq = event.seq;
                    return Some(event);
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => self.refill(),
                Err(_) => return None,
            }
        }
    }

    fn refill(&mut self) {
        let mut inner = self.log.inner.lock();
        if let Ok(entries) = inner.wal.entries_after(self.last_seq) {
            self.backlog = entries.into();
        }
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
