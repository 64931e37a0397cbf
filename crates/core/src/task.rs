// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and state machine.

use crate::event::{CancelPhase, EventBody};
use crate::id::{TaskId, TopicSlug};
use crate::session::{SessionId, SessionStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Ordered priority set for tasks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

crate::simple_display! {
    Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Task lifecycle status (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Draft,
    Refining,
    ReadyToHandoff,
    HandedOff,
    Running,
    AwaitingGate,
    AwaitingUser,
    Done,
    Failed,
    Canceled,
}

crate::simple_display! {
    TaskStatus {
        Draft => "draft",
        Refining => "refining",
        ReadyToHandoff => "ready_to_handoff",
        HandedOff => "handed_off",
        Running => "running",
        AwaitingGate => "awaiting_gate",
        AwaitingUser => "awaiting_user",
        Done => "done",
        Failed => "failed",
        Canceled => "canceled",
    }
}

impl TaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled)
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {event} not permitted in status {status}")]
pub struct TransitionError {
    pub status: TaskStatus,
    pub event: &'static str,
}

impl TaskStatus {
    fn reject(self, body: &EventBody) -> Result<TaskStatus, TransitionError> {
        Err(TransitionError { status: self, event: body.type_str() })
    }

    /// Apply an event body to this status, yielding the next status.
    ///
    /// This is the authoritative transition table; the event log validates
    /// proposed events against it before persisting anything. Events that
    /// carry observations rather than status changes return the current
    /// status unchanged (but still require a non-terminal task, except for
    /// the cancellation confirmation phases).
    pub fn apply(self, body: &EventBody) -> Result<TaskStatus, TransitionError> {
        use TaskStatus::*;

        // Cancellation confirmations are the one thing a terminal task may
        // still observe: the pending phase already moved it to Canceled.
        if self.is_terminal() {
            return match body {
                EventBody::TaskCanceled {
                    phase: CancelPhase::Confirmed | CancelPhase::Unconfirmed,
                    ..
                } if self == Canceled => Ok(Canceled),
                _ => self.reject(body),
            };
        }

        match body {
            EventBody::TaskCreated { .. } => self.reject(body),

            EventBody::WorkingPromptUpdated { .. } => match self {
                Draft | Refining => Ok(Refining),
                _ => self.reject(body),
            },

            EventBody::QuestionsRaised { .. } => match self {
                Refining => Ok(AwaitingUser),
                _ => self.reject(body),
            },

            EventBody::UserAnswered { .. } => match self {
                AwaitingUser => Ok(Refining),
                _ => self.reject(body),
            },

            EventBody::HandoffFrozen { .. } => match self {
                Refining => Ok(ReadyToHandoff),
                _ => self.reject(body),
            },

            EventBody::BuilderDispatched { .. } => match self {
                ReadyToHandoff => Ok(HandedOff),
                _ => self.reject(body),
            },

            EventBody::BuilderStatusChanged { status, .. } => match status {
                SessionStatus::Running => match self {
                    HandedOff | Running => Ok(Running),
                    _ => self.reject(body),
                },
                // Other session statuses are observations; the task moves
                // via BuildCompleted/BuildFailed/TaskCanceled.
                _ => Ok(self),
            },

            EventBody::GateRequested { .. } => match self {
                Running => Ok(AwaitingGate),
                _ => self.reject(body),
            },

            EventBody::GateApproved { .. } | EventBody::GateDenied { .. } => match self {
                AwaitingGate => Ok(Running),
                _ => self.reject(body),
            },

            EventBody::BuildCompleted { .. } => match self {
                Running | AwaitingGate => Ok(Done),
                _ => self.reject(body),
            },

            EventBody::BuildFailed { .. } => Ok(Failed),

            EventBody::TaskCanceled { phase, .. } => match phase {
                CancelPhase::Pending => Ok(Canceled),
                // Confirmation without a preceding pending phase.
                CancelPhase::Confirmed | CancelPhase::Unconfirmed => self.reject(body),
            },

            // Non-status-changing observations.
            EventBody::ExternalTaskLinked { .. }
            | EventBody::QuickDispatchRequested { .. }
            | EventBody::QuickDispatchExecuted { .. }
            | EventBody::QuickDispatchBlocked { .. } => Ok(self),
        }
    }
}

/// A unit of work tracked by the control plane.
///
/// Mutated only via events; see `cvr-storage`'s state module for the apply
/// logic that keeps these fields in sync with the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub topic: TopicSlug,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_prompt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_prompt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_spec_path: Option<PathBuf>,
    /// Pointer into the external task graph; once set, never reassigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_kind: Option<String>,
    /// Seq of the most recent event applied to this task.
    pub last_event_seq: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            title: String = "test task",
            topic: TopicSlug = TopicSlug::new("test-task"),
        }
        set {
            status: TaskStatus = TaskStatus::Draft,
            priority: Priority = Priority::Normal,
            last_event_seq: u64 = 0,
            created_at_ms: u64 = 0,
            updated_at_ms: u64 = 0,
        }
        option {
            working_prompt_path: PathBuf = None,
            handoff_prompt_path: PathBuf = None,
            handoff_spec_path: PathBuf = None,
            external_task_id: String = None,
            builder_session_id: SessionId = None,
            builder_kind: String = None,
        }
        computed {
            id: TaskId = TaskId::new(),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
