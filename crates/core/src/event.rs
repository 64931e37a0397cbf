// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain events.
//!
//! Events are the only mutation path in the system: every observable state
//! field is derivable by replaying them in `seq` order. The persisted shape
//! is `{seq, time, type, task_id?, refs?, payload}`; the `type` strings are
//! part of the on-disk format and must stay stable.

use crate::handoff::GateKind;
use crate::id::{CommandId, TaskId, TopicSlug};
use crate::session::{ArtifactPointer, SessionId, SessionStatus};
use crate::task::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Optional pointers carried alongside an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    /// Client command id recorded so command idempotency survives replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
}

impl EventRefs {
    pub fn is_empty(&self) -> bool {
        self.external_task_id.is_none()
            && self.session_id.is_none()
            && self.artifact_path.is_none()
            && self.command_id.is_none()
    }

    pub fn command(command_id: CommandId) -> Self {
        Self { command_id: Some(command_id), ..Self::default() }
    }
}

/// Phase of a two-step cancellation.
///
/// `Pending` is appended immediately when cancellation is requested; a
/// follow-up `Confirmed` or `Unconfirmed` is appended once the remote abort
/// resolves (or times out). Subscribers observe both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPhase {
    Pending,
    Confirmed,
    Unconfirmed,
}

crate::simple_display! {
    CancelPhase {
        Pending => "pending",
        Confirmed => "confirmed",
        Unconfirmed => "unconfirmed",
    }
}

/// The closed set of domain event bodies.
///
/// Serializes adjacently tagged as `{"type": "...", "payload": {...}}` so the
/// envelope flattens to the stable on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    TaskCreated {
        title: String,
        priority: Priority,
        topic: TopicSlug,
    },

    WorkingPromptUpdated {
        /// Short caller-provided delta summary, never the full file.
        delta_summary: String,
        path: PathBuf,
    },

    QuestionsRaised {
        questions: Vec<String>,
    },

    UserAnswered {
        answers: serde_json::Value,
    },

    HandoffFrozen {
        topic: TopicSlug,
        handoff_md_path: PathBuf,
        handoff_json_path: PathBuf,
        /// sha256 hex digest of handoff.json, the dispatch-token input.
        digest: String,
    },

    ExternalTaskLinked {
        external_task_id: String,
    },

    BuilderDispatched {
        builder_kind: String,
        session_id: SessionId,
        dispatch_token: String,
    },

    BuilderStatusChanged {
        status: SessionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    GateRequested {
        gate: GateKind,
        /// Remote-supplied detail (e.g. the files a write gate covers).
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        detail: serde_json::Value,
    },

    GateApproved {
        gate: GateKind,
    },

    GateDenied {
        gate: GateKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    BuildCompleted {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        artifacts: Vec<ArtifactPointer>,
    },

    BuildFailed {
        reason: String,
    },

    TaskCanceled {
        reason: String,
        phase: CancelPhase,
    },

    QuickDispatchRequested {
        builder_kind: String,
        summary: String,
    },

    QuickDispatchExecuted {
        session_id: SessionId,
    },

    QuickDispatchBlocked {
        reason: String,
    },
}

impl EventBody {
    /// The stable type string (matches the serde tag).
    pub fn type_str(&self) -> &'static str {
        match self {
            EventBody::TaskCreated { .. } => "TaskCreated",
            EventBody::WorkingPromptUpdated { .. } => "WorkingPromptUpdated",
            EventBody::QuestionsRaised { .. } => "QuestionsRaised",
            EventBody::UserAnswered { .. } => "UserAnswered",
            EventBody::HandoffFrozen { .. } => "HandoffFrozen",
            EventBody::ExternalTaskLinked { .. } => "ExternalTaskLinked",
            EventBody::BuilderDispatched { .. } => "BuilderDispatched",
            EventBody::BuilderStatusChanged { .. } => "BuilderStatusChanged",
            EventBody::GateRequested { .. } => "GateRequested",
            EventBody::GateApproved { .. } => "GateApproved",
            EventBody::GateDenied { .. } => "GateDenied",
            EventBody::BuildCompleted { .. } => "BuildCompleted",
            EventBody::BuildFailed { .. } => "BuildFailed",
            EventBody::TaskCanceled { .. } => "TaskCanceled",
            EventBody::QuickDispatchRequested { .. } => "QuickDispatchRequested",
            EventBody::QuickDispatchExecuted { .. } => "QuickDispatchExecuted",
            EventBody::QuickDispatchBlocked { .. } => "QuickDispatchBlocked",
        }
    }
}

/// A persisted event with its assigned sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<EventRefs>,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Event {
    pub fn command_id(&self) -> Option<&CommandId> {
        self.refs.as_ref().and_then(|r| r.command_id.as_ref())
    }
}

/// An event proposed for append, before seq/time assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedEvent {
    pub task_id: Option<TaskId>,
    pub refs: Option<EventRefs>,
    pub body: EventBody,
}

impl ProposedEvent {
    pub fn new(task_id: TaskId, body: EventBody) -> Self {
        Self { task_id: Some(task_id), refs: None, body }
    }

    pub fn unscoped(body: EventBody) -> Self {
        Self { task_id: None, refs: None, body }
    }

    pub fn with_refs(mut self, refs: EventRefs) -> Self {
        self.refs = if refs.is_empty() { None } else { Some(refs) };
        self
    }

    pub fn with_command_id(mut self, command_id: Option<CommandId>) -> Self {
        if let Some(id) = command_id {
            let refs = self.refs.get_or_insert_with(EventRefs::default);
            refs.command_id = Some(id);
        }
        self
    }

    /// Stamp seq and time to produce the persistable event.
    pub fn into_event(self, seq: u64, time: DateTime<Utc>) -> Event {
        Event { seq, time, task_id: self.task_id, refs: self.refs, body: self.body }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
