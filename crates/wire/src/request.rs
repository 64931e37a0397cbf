// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Request from the voice layer to the daemon.
///
/// Commands are synchronous from the caller's perspective: they return an
/// immediate result or a pending handle (task id + last seq) resolvable by
/// following the event stream. Each mutating variant accepts an optional
/// `command_id`; a repeat with the same id yields the original outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Create a new task in draft
    CreateTask {
        title: String,
        #[serde(default)]
        priority: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Replace the working prompt for a task
    UpdateWorkingPrompt {
        task_id: String,
        /// Short description of what changed (never the full file)
        delta_summary: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Record open questions, parking the task on the user
    RaiseQuestions {
        task_id: String,
        questions: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Record the user's answers, resuming refinement
    AnswerQuestions {
        task_id: String,
        answers: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Freeze the working prompt into the immutable handoff pair
    FreezePrompt {
        task_id: String,
        /// Optional explicit execution contract; derived from the task
        /// when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spec: Option<cvr_core::handoff::HandoffSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Dispatch a frozen handoff to a builder
    Dispatch {
        task_id: String,
        builder_kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Resolve a pending gate
    ResolveGate {
        task_id: String,
        approve: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Cancel a task (two-phase; the response reports the pending append)
    Cancel {
        task_id: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Attach an external task-graph pointer (idempotent)
    LinkExternal {
        task_id: String,
        external_task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Capture, freeze, and dispatch in one stroke
    QuickDispatch {
        title: String,
        prompt: String,
        builder_kind: String,
        /// Optional explicit execution contract; derived from the task
        /// when omitted. A contract demanding the destructive gate is
        /// blocked rather than dispatched.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spec: Option<cvr_core::handoff::HandoffSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },

    /// Send user input into a task's live builder session
    SendInput { task_id: String, content: String },

    /// Record an utterance into the conversation feed
    RecordUtterance { role: crate::types::ConversationRole, text: String },

    /// Current control-plane status
    GetStatus,

    /// Pointer-first context lookup (external retrieval store)
    LookupContext { query: String },

    /// Delivery hints ready for the voice layer (called at natural pauses)
    PollPendingDelivery,

    /// Acknowledge inbox items
    AcknowledgeInbox { ids: Vec<String> },

    /// Request daemon shutdown
    Shutdown,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
