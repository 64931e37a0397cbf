// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State materialized from event replay.

mod inbox;
mod sessions;
mod tasks;

use cvr_core::event::{Event, EventBody};
use cvr_core::id::{CommandId, TaskId};
use cvr_core::inbox::InboxItem;
use cvr_core::session::{BuilderSession, SessionId};
use cvr_core::task::Task;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Frozen handoff record for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenInfo {
    pub handoff_md_path: PathBuf,
    pub handoff_json_path: PathBuf,
    pub digest: String,
    /// Seq of the HandoffFrozen event.
    pub seq: u64,
}

/// Per-topic state derived from prompt events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_path: Option<PathBuf>,
    /// Set exactly once; a frozen topic's working prompt is immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<FrozenInfo>,
}

impl TopicRecord {
    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }
}

/// Outcome of a previously executed client command, kept so a duplicate
/// command id returns the original result without appending anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Seq of the first event the command produced.
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Materialized state built from event replay.
///
/// # Idempotency Requirement
///
/// **All event handlers MUST be idempotent.** Applying the same event twice
/// must produce the same state as applying it once — events are applied both
/// at append time and again when a snapshot is behind the WAL on boot.
///
/// Guidelines:
/// - Use assignment instead of `+=`-style mutation
/// - Guard inserts with existence checks
/// - Guard status edits by routing through the transition table (invalid
///   re-application keeps the current status)
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreState {
    pub tasks: HashMap<TaskId, Task>,
    pub sessions: HashMap<SessionId, BuilderSession>,
    pub topics: HashMap<String, TopicRecord>,
    /// Inbox items in creation order (delivery reordering happens in the
    /// notifier, never in storage).
    pub inbox: Vec<InboxItem>,
    /// Client command id → outcome, for command idempotency across restarts.
    pub commands: HashMap<String, CommandRecord>,
    /// Seq of the last applied event.
    pub last_seq: u64,
}

impl CoreState {
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Find a task by exact id or unique prefix (like git object names).
    pub fn find_task(&self, id: &str) -> Option<&Task> {
        if let Some(task) = self.tasks.get(id) {
            return Some(task);
        }
        let mut matches = self.tasks.values().filter(|t| t.id.as_str().starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Some(task),
            _ => None,
        }
    }

    /// The live (non-terminal) session owned by a task, if any.
    pub fn live_session_for(&self, task_id: &TaskId) -> Option<&BuilderSession> {
        self.sessions
            .values()
            .find(|s| s.task_id == *task_id && s.is_live())
    }

    pub fn command_outcome(&self, command_id: &CommandId) -> Option<&CommandRecord> {
        self.commands.get(command_id.as_str())
    }

    /// Count of inbox items not yet acknowledged.
    pub fn unread_count(&self) -> usize {
        self.inbox.iter().filter(|i| i.is_unread()).count()
    }

    /// Apply an event to derive state changes.
    ///
    /// Events are facts about what happened; state is a pure function of
    /// the ordered facts.
    pub fn apply_event(&mut self, event: &Event) {
        match &event.body {
            EventBody::TaskCreated { .. }
            | EventBody::WorkingPromptUpdated { .. }
            | EventBody::QuestionsRaised { .. }
            | EventBody::UserAnswered { .. }
            | EventBody::HandoffFrozen { .. }
            | EventBody::ExternalTaskLinked { .. }
            | EventBody::QuickDispatchRequested { .. }
            | EventBody::QuickDispatchExecuted { .. }
            | EventBody::QuickDispatchBlocked { .. } => tasks::apply(self, event),

            EventBody::BuilderDispatched { .. }
            | EventBody::BuilderStatusChanged { .. }
            | EventBody::GateRequested { .. }
            | EventBody::GateApproved { .. }
            | EventBody::GateDenied { .. }
            | EventBody::BuildCompleted { .. }
            | EventBody::BuildFailed { .. }
            | EventBody::TaskCanceled { .. } => sessions::apply(self, event),
        }

        inbox::apply(self, event);
        self.record_command(event);
        if event.seq > self.last_seq {
            self.last_seq = event.seq;
        }
    }

    fn record_command(&mut self, event: &Event) {
        let Some(command_id) = event.command_id() else {
            return;
        };
        // First event for a command id wins; replays keep the original.
        self.commands
            .entry(command_id.as_str().to_string())
            .or_insert(CommandRecord { seq: event.seq, task_id: event.task_id });
    }

    /// Shared task bookkeeping: status transition plus freshness fields.
    pub(crate) fn touch_task(&mut self, event: &Event) {
        let Some(task_id) = event.task_id else {
            return;
        };
        let Some(task) = self.tasks.get_mut(&task_id) else {
            return;
        };
        if let Ok(next) = task.status.apply(&event.body) {
            task.status = next;
        }
        if event.seq > task.last_event_seq {
            task.last_event_seq = event.seq;
            task.updated_at_ms = event.time.timestamp_millis() as u64;
        }
    }
}

#[cfg(test)]
#[path = "../state_tests/mod.rs"]
mod tests;
