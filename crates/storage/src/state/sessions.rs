// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder session state derived from dispatch and stream events.

use super::CoreState;
use cvr_core::event::{CancelPhase, Event, EventBody};
use cvr_core::session::{BuilderSession, SessionStatus};

pub(super) fn apply(state: &mut CoreState, event: &Event) {
    let time_ms = event.time.timestamp_millis() as u64;

    match &event.body {
        EventBody::BuilderDispatched { builder_kind, session_id, dispatch_token } => {
            if let Some(task_id) = event.task_id {
                state
                    .sessions
                    .entry(session_id.clone())
                    .or_insert_with(|| BuilderSession {
                        id: session_id.clone(),
                        task_id,
                        builder_kind: builder_kind.clone(),
                        status: SessionStatus::Created,
                        started_at_ms: time_ms,
                        ended_at_ms: None,
                        artifacts: Vec::new(),
                        dispatch_token: dispatch_token.clone(),
                        pending_gate: None,
                    });
                if let Some(task) = state.tasks.get_mut(&task_id) {
                    task.builder_session_id = Some(session_id.clone());
                    task.builder_kind = Some(builder_kind.clone());
                }
            }
        }

        EventBody::BuilderStatusChanged { status, .. } => {
            if let Some(session) = live_session_mut(state, event) {
                // Lost is an observation; the record remembers it as Failed.
                let recorded = match status {
                    SessionStatus::Lost => SessionStatus::Failed,
                    other => *other,
                };
                session.status = recorded;
                if recorded.is_terminal() && session.ended_at_ms.is_none() {
                    session.ended_at_ms = Some(time_ms);
                }
            }
        }

        EventBody::GateRequested { gate, .. } => {
            if let Some(session) = live_session_mut(state, event) {
                session.status = SessionStatus::WaitingPermission;
                session.pending_gate = Some(*gate);
            }
        }

        EventBody::GateApproved { .. } | EventBody::GateDenied { .. } => {
            if let Some(session) = live_session_mut(state, event) {
                session.pending_gate = None;
                if session.status == SessionStatus::WaitingPermission {
                    session.status = SessionStatus::Running;
                }
            }
        }

        EventBody::BuildCompleted { artifacts } => {
            if let Some(session) = live_session_mut(state, event) {
                session.status = SessionStatus::Completed;
                if session.ended_at_ms.is_none() {
                    session.ended_at_ms = Some(time_ms);
                }
                for artifact in artifacts {
                    if !session.artifacts.iter().any(|a| a.path == artifact.path) {
                        session.artifacts.push(artifact.clone());
                    }
                }
            }
        }

        EventBody::BuildFailed { .. } => {
            if let Some(session) = live_session_mut(state, event) {
                session.status = SessionStatus::Failed;
                if session.ended_at_ms.is_none() {
                    session.ended_at_ms = Some(time_ms);
                }
            }
        }

        EventBody::TaskCanceled { phase, .. } => {
            // The session ends when the cancellation resolves; the pending
            // phase leaves it live so the abort path can still observe it.
            if matches!(phase, CancelPhase::Confirmed | CancelPhase::Unconfirmed) {
                if let Some(session) = live_session_mut(state, event) {
                    session.status = SessionStatus::Aborted;
                    if session.ended_at_ms.is_none() {
                        session.ended_at_ms = Some(time_ms);
                    }
                }
            }
        }

        _ => {}
    }

    state.touch_task(event);
}

/// The live session the event refers to: by explicit ref when present,
/// otherwise the task's single live session.
fn live_session_mut<'a>(
    state: &'a mut CoreState,
    event: &Event,
) -> Option<&'a mut BuilderSession> {
    let by_ref = event
        .refs
        .as_ref()
        .and_then(|r| r.session_id.clone());
    match by_ref {
        Some(id) => state.sessions.get_mut(&id).filter(|s| s.is_live()),
        None => {
            let task_id = event.task_id?;
            state
                .sessions
                .values_mut()
                .find(|s| s.task_id == task_id && s.is_live())
        }
    }
}
