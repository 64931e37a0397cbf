// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session reconciliation after daemon restart.
//!
//! For every non-terminal task with a recorded builder session, asks the
//! remote for the session's health and either resumes the stream from the
//! cached cursor, synthesizes the terminal event that was missed, or
//! declares the session lost.

use crate::DaemonPool;
use cvr_adapters::{load_cursor, SessionHealth};
use cvr_core::event::{EventBody, EventRefs, ProposedEvent};
use cvr_core::session::SessionStatus;
use cvr_storage::EventLog;
use std::path::Path;
use tracing::{info, warn};

pub(crate) async fn reconcile_state(pool: &DaemonPool, log: &EventLog, cursor_dir: &Path) {
    let candidates: Vec<_> = log.with_state(|state| {
        state
            .tasks
            .values()
            .filter(|t| !t.is_terminal())
            .filter_map(|t| {
                let session_id = t.builder_session_id.clone()?;
                let kind = t.builder_kind.clone()?;
                let token = state
                    .sessions
                    .get(&session_id)
                    .map(|s| s.dispatch_token.clone())
                    .unwrap_or_default();
                Some((t.id, session_id, kind, token))
            })
            .collect()
    });

    if candidates.is_empty() {
        return;
    }
    info!("reconciling {} builder session(s)", candidates.len());

    for (task_id, session_id, kind, token) in candidates {
        let publish = |body: EventBody| {
            let proposed = ProposedEvent::new(task_id, body).with_refs(EventRefs {
                session_id: Some(session_id.clone()),
                ..EventRefs::default()
            });
            if let Err(e) = log.append(proposed) {
                warn!(task = %task_id, error = %e, "reconcile append rejected");
            }
        };

        match pool.health(&kind, &session_id).await {
            Ok(SessionHealth::Running) => {
                let cursor = load_cursor(cursor_dir, &session_id);
                info!(
                    task = %task_id,
                    session = %session_id,
                    cursor,
                    "recovering: builder session still running, resuming stream"
                );
                if let Err(e) = pool.resume(task_id, session_id.clone(), &kind, token, cursor) {
                    warn!(task = %task_id, error = %e, "stream resume failed, marking lost");
                    publish(EventBody::BuilderStatusChanged {
                        status: SessionStatus::Lost,
                        reason: Some("resume failed at recovery".into()),
                    });
                    publish(EventBody::BuildFailed {
                        reason: "builder session lost at recovery".into(),
                    });
                }
            }

            Ok(SessionHealth::Terminal { status, reason }) => {
                info!(
                    task = %task_id,
                    session = %session_id,
                    status = %status,
                    "recovering: builder finished while daemon was down"
                );
                match status.as_str() {
                    "completed" => publish(EventBody::BuildCompleted { artifacts: Vec::new() }),
                    _ => publish(EventBody::BuildFailed {
                        reason: reason
                            .unwrap_or_else(|| format!("builder reported {} at recovery", status)),
                    }),
                }
            }

            Ok(SessionHealth::Gone) => {
                info!(
                    task = %task_id,
                    session = %session_id,
                    "recovering: builder session gone"
                );
                publish(EventBody::BuilderStatusChanged {
                    status: SessionStatus::Lost,
                    reason: Some("session unknown to builder at recovery".into()),
                });
                publish(EventBody::BuildFailed {
                    reason: "builder session lost at recovery".into(),
                });
            }

            Err(e) => {
                warn!(task = %task_id, session = %session_id, error = %e, "health check failed");
                publish(EventBody::BuilderStatusChanged {
                    status: SessionStatus::Lost,
                    reason: Some(format!("health check failed: {}", e)),
                });
                publish(EventBody::BuildFailed {
                    reason: "remote_unavailable".into(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
