// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol DTOs shared by the IPC surface, the REST snapshots, and the
//! WebSocket broadcast.

use cvr_core::inbox::{InboxItem, Severity};
use cvr_core::session::{ArtifactPointer, BuilderSession, SessionStatus};
use cvr_core::task::{Priority, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Compact task row for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_kind: Option<String>,
    pub last_event_seq: u64,
    pub updated_at_ms: u64,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.as_str().to_string(),
            title: task.title.clone(),
            status: task.status,
            priority: task.priority,
            builder_kind: task.builder_kind.clone(),
            last_event_seq: task.last_event_seq,
            updated_at_ms: task.updated_at_ms,
        }
    }
}

/// Full task detail, including its session if one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_prompt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_prompt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_spec_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
}

impl TaskDetail {
    pub fn new(task: &Task, session: Option<&BuilderSession>) -> Self {
        Self {
            summary: TaskSummary::from(task),
            topic: task.topic.as_str().to_string(),
            working_prompt_path: task.working_prompt_path.clone(),
            handoff_prompt_path: task.handoff_prompt_path.clone(),
            handoff_spec_path: task.handoff_spec_path.clone(),
            external_task_id: task.external_task_id.clone(),
            created_at_ms: task.created_at_ms,
            session: session.map(SessionSummary::from),
        }
    }
}

/// Builder session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub task_id: String,
    pub builder_kind: String,
    pub status: SessionStatus,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactPointer>,
}

impl From<&BuilderSession> for SessionSummary {
    fn from(session: &BuilderSession) -> Self {
        Self {
            id: session.id.to_string(),
            task_id: session.task_id.as_str().to_string(),
            builder_kind: session.builder_kind.clone(),
            status: session.status,
            started_at_ms: session.started_at_ms,
            ended_at_ms: session.ended_at_ms,
            artifacts: session.artifacts.clone(),
        }
    }
}

/// Inbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub event_seq: u64,
    pub created_at_ms: u64,
    pub read: bool,
}

impl From<&InboxItem> for InboxEntry {
    fn from(item: &InboxItem) -> Self {
        Self {
            id: item.id.as_str().to_string(),
            severity: item.severity,
            summary: item.summary.clone(),
            detail: item.detail.clone(),
            task_id: item.task_id.map(|id| id.as_str().to_string()),
            event_seq: item.event_seq,
            created_at_ms: item.created_at_ms,
            read: item.read_at_ms.is_some(),
        }
    }
}

/// Configured builder row with pool occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderSummary {
    pub name: String,
    pub kind: String,
    pub endpoint: String,
    pub live_sessions: usize,
    pub max_sessions: usize,
}

/// System health snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthSummary {
    pub uptime_secs: u64,
    pub last_seq: u64,
    pub tasks_active: usize,
    pub unread_inbox: usize,
    /// True when the event log refused writes after storage failures.
    pub degraded: bool,
}

/// Speaker of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRole {
    User,
    Assistant,
}

/// One utterance in the conversation feed (separate from the domain log).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Feed cursor, monotonic within the rolling buffer's lifetime.
    pub cursor: u64,
    pub role: ConversationRole,
    pub text: String,
    pub time_ms: u64,
}

/// Task change notification for the broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub seq: u64,
    pub task: TaskSummary,
}

/// Builder session status notification for the broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderStatusUpdate {
    pub seq: u64,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A `/ws/events` broadcast message: `{type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsMessage {
    ConversationEntry(ConversationEntry),
    TaskUpdate(TaskUpdate),
    InboxItem(InboxEntry),
    BuilderStatus(BuilderStatusUpdate),
}

impl WsMessage {
    /// Domain-log cursor carried by this message, if any (conversation
    /// entries ride a separate feed cursor).
    pub fn seq(&self) -> Option<u64> {
        match self {
            WsMessage::ConversationEntry(_) => None,
            WsMessage::TaskUpdate(u) => Some(u.seq),
            WsMessage::InboxItem(i) => Some(i.event_seq),
            WsMessage::BuilderStatus(b) => Some(b.seq),
        }
    }
}

/// Pointer-first context lookup hit (the retrieval store is external; only
/// pointers and summaries cross the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHitEntry {
    pub path: PathBuf,
    pub summary: String,
    pub score: f64,
}

/// Delivery hint handed to the voice layer by the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryHint {
    /// Deliver as soon as possible (blocking severity).
    pub immediate: bool,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Inbox items covered by this hint (coalesced hints carry several).
    pub item_ids: Vec<String>,
    pub created_at_ms: u64,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
