// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox items: the user-visible event feed.
//!
//! Items are derived from notifying events in the same state application
//! step that applies the event, so event and item become visible atomically.

use crate::event::{CancelPhase, EventBody};
use crate::id::{InboxId, TaskId};
use crate::session::SessionStatus;
use serde::{Deserialize, Serialize};

/// Maximum summary length; longer summaries are clamped.
pub const SUMMARY_MAX: usize = 140;

/// Severity of an inbox item, ordered for delivery purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Blocking,
}

crate::simple_display! {
    Severity {
        Info => "info",
        Success => "success",
        Warning => "warning",
        Error => "error",
        Blocking => "blocking",
    }
}

/// A user-visible notification derived from a domain event.
///
/// Created exactly once per notifying event; acknowledged by user action;
/// never otherwise mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxItem {
    pub id: InboxId,
    pub severity: Severity,
    /// Short natural-language summary (≤ 140 chars).
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Seq of the event this item was derived from.
    pub event_seq: u64,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at_ms: Option<u64>,
}

impl InboxItem {
    pub fn is_unread(&self) -> bool {
        self.read_at_ms.is_none()
    }
}

/// Clamp a summary to [`SUMMARY_MAX`] characters.
pub fn clamp_summary(s: &str) -> String {
    if s.chars().count() <= SUMMARY_MAX {
        return s.to_string();
    }
    let mut out: String = s.chars().take(SUMMARY_MAX - 1).collect();
    out.push('…');
    out
}

/// Severity for a notifying event body, `None` for silent events.
///
/// The notifying set: completions, failures, gate requests, resolved
/// cancellations, lost builders, and blocked quick dispatches. The pending
/// cancellation phase is silent (the resolution phase notifies).
pub fn severity_for(body: &EventBody) -> Option<Severity> {
    match body {
        EventBody::BuildCompleted { .. } => Some(Severity::Success),
        EventBody::BuildFailed { .. } => Some(Severity::Error),
        EventBody::GateRequested { .. } => Some(Severity::Blocking),
        EventBody::TaskCanceled { phase: CancelPhase::Confirmed, .. } => Some(Severity::Info),
        EventBody::TaskCanceled { phase: CancelPhase::Unconfirmed, .. } => {
            Some(Severity::Warning)
        }
        EventBody::TaskCanceled { phase: CancelPhase::Pending, .. } => None,
        EventBody::BuilderStatusChanged { status: SessionStatus::Lost, .. } => {
            Some(Severity::Warning)
        }
        EventBody::QuickDispatchBlocked { .. } => Some(Severity::Warning),
        _ => None,
    }
}

#[cfg(test)]
#[path = "inbox_tests.rs"]
mod tests;
