// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec: crash-recovery determinism.
//!
//! The log persisted up to a pending gate; a cold boot restores the same
//! derived state, replays identical events, and the flow continues as if
//! never interrupted.

use super::prelude::Core;
use cvr_adapters::RemoteEvent;
use cvr_core::task::TaskStatus;
use tempfile::tempdir;

#[tokio::test]
async fn cold_boot_restores_pending_gate_and_continues() {
    let dir = tempdir().unwrap();

    // First life: run scenario 2 up to the gate request, then "crash".
    let (task_id, session_id, events_before) = {
        let core = Core::open(dir.path());
        let (task_id, session_id) = core.running_task().await;
        core.fake.push_event(
            &session_id,
            RemoteEvent::Gate {
                kind: "write".into(),
                detail: serde_json::json!({"files": ["src/auth/mw.ts"]}),
            },
        );
        core.wait_status(&task_id, TaskStatus::AwaitingGate).await;
        let events = core.event_types_after(0, core.log.last_seq() as usize).await;
        (task_id, session_id, events)
        // Dropping everything here is the crash: no shutdown hooks run.
    };

    // Second life: cold boot from the same root.
    let core = Core::open(dir.path());

    // Derived state restored to awaiting_gate with the pending gate.
    assert_eq!(core.status_of(&task_id), Some(TaskStatus::AwaitingGate));
    let pending_gate = core.log.with_state(|s| {
        s.sessions.get(session_id.as_str()).and_then(|se| se.pending_gate)
    });
    assert_eq!(pending_gate, Some(cvr_core::GateKind::Write));

    // Subscribing from seq 0 replays exactly the pre-crash events.
    let replayed = core.event_types_after(0, events_before.len()).await;
    assert_eq!(replayed, events_before);

    // Resume the still-running remote session, then continue the flow.
    core.fake.set_health(session_id.as_str(), cvr_adapters::SessionHealth::Running);
    core.pool
        .resume(
            cvr_core::id::TaskId::from_string(&task_id),
            cvr_core::session::SessionId::new(session_id.as_str()),
            "default",
            "tok".into(),
            0,
        )
        .unwrap();

    core.orchestrator.resolve_gate(&task_id, true, None).await.unwrap();
    core.wait_status(&task_id, TaskStatus::Running).await;

    core.fake.push_event(
        &session_id,
        RemoteEvent::Completed {
            artifacts: vec![cvr_adapters::RemoteArtifact {
                kind: "diff".into(),
                path: "diff-2026-01-12.md".into(),
            }],
        },
    );
    core.wait_status(&task_id, TaskStatus::Done).await;

    // The continuation matches an uninterrupted run.
    let tail = core.event_types_after(8, 2).await;
    assert_eq!(tail, vec!["GateApproved", "BuildCompleted"]);
}

#[tokio::test]
async fn replay_equals_incremental_state() {
    let dir = tempdir().unwrap();

    let before = {
        let core = Core::open(dir.path());
        let (task_id, session_id) = core.running_task().await;
        core.fake.push_event(
            &session_id,
            RemoteEvent::Gate { kind: "run".into(), detail: serde_json::Value::Null },
        );
        core.wait_status(&task_id, TaskStatus::AwaitingGate).await;
        core.log.state_clone()
    };

    let core = Core::open(dir.path());
    assert_eq!(core.log.state_clone(), before);
}
