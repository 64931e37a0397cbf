// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox items derived from notifying events.
//!
//! Derivation happens inside the same apply step as the event itself, so an
//! event and its item become visible atomically. Item ids are a pure
//! function of the event seq, keeping replay deterministic.

use super::CoreState;
use cvr_core::event::{CancelPhase, Event, EventBody};
use cvr_core::id::InboxId;
use cvr_core::inbox::{clamp_summary, severity_for, InboxItem};
use cvr_core::session::SessionStatus;

pub(super) fn apply(state: &mut CoreState, event: &Event) {
    let Some(severity) = severity_for(&event.body) else {
        return;
    };
    // Exactly one item per notifying event, replay-safe.
    if state.inbox.iter().any(|i| i.event_seq == event.seq) {
        return;
    }

    let title = event
        .task_id
        .and_then(|id| state.tasks.get(&id))
        .map(|t| t.title.clone())
        .unwrap_or_else(|| "task".to_string());

    let (summary, detail) = describe(&event.body, &title);

    state.inbox.push(InboxItem {
        id: InboxId::from_string(format!("inb-{:016}", event.seq)),
        severity,
        summary: clamp_summary(&summary),
        detail,
        task_id: event.task_id,
        event_seq: event.seq,
        created_at_ms: event.time.timestamp_millis() as u64,
        read_at_ms: None,
    });
}

/// Short natural-language summary plus optional detail pointer.
fn describe(body: &EventBody, title: &str) -> (String, Option<String>) {
    match body {
        EventBody::BuildCompleted { artifacts } => {
            let detail = artifacts
                .first()
                .map(|a| a.path.display().to_string());
            (format!("{} finished", title), detail)
        }
        EventBody::BuildFailed { reason } => {
            (format!("{} failed", title), Some(reason.clone()))
        }
        EventBody::GateRequested { gate, detail } => (
            format!("{} needs {} approval", title, gate),
            if detail.is_null() { None } else { Some(detail.to_string()) },
        ),
        EventBody::TaskCanceled { reason, phase: CancelPhase::Confirmed } => {
            (format!("{} canceled", title), Some(reason.clone()))
        }
        EventBody::TaskCanceled { reason, phase: CancelPhase::Unconfirmed } => (
            format!("{} canceled, builder abort unconfirmed", title),
            Some(reason.clone()),
        ),
        EventBody::BuilderStatusChanged { status: SessionStatus::Lost, reason } => (
            format!("lost contact with builder for {}", title),
            reason.clone(),
        ),
        EventBody::QuickDispatchBlocked { reason } => {
            (format!("quick dispatch blocked for {}", title), Some(reason.clone()))
        }
        _ => (title.to_string(), None),
    }
}
