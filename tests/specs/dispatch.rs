// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec: dispatch, gate, complete — and duplicate dispatch idempotency.

use super::prelude::Core;
use cvr_adapters::RemoteEvent;
use cvr_core::inbox::Severity;
use cvr_core::task::TaskStatus;
use tempfile::tempdir;

#[tokio::test]
async fn dispatch_gate_complete() {
    let dir = tempdir().unwrap();
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

    // Events appended in the canonical order.
    let types = core.event_types_after(5, 5).await;
    assert_eq!(
        types,
        vec![
            "BuilderDispatched",
            "BuilderStatusChanged",
            "GateRequested",
            "GateApproved",
            "BuildCompleted"
        ]
    );

    // Inbox: one blocking (gate), one success (completion); ack the gate.
    let inbox = core.log.snapshot().inbox;
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].severity, Severity::Blocking);
    assert_eq!(inbox[1].severity, Severity::Success);

    let acked = core.log.acknowledge_inbox(&[inbox[0].id], 1);
    assert_eq!(acked.len(), 1);
    let inbox = core.log.snapshot().inbox;
    assert!(inbox[0].read_at_ms.is_some());
    assert!(inbox[1].read_at_ms.is_none());

    // The session record carries the reported artifact.
    let session = core.log.with_state(|s| s.sessions.get(session_id.as_str()).cloned()).unwrap();
    assert_eq!(session.artifacts.len(), 1);
    assert!(session
        .artifacts
        .iter()
        .any(|a| a.path.to_string_lossy().contains("diff-2026-01-12")));
}

#[tokio::test]
async fn duplicate_dispatch_is_idempotent() {
    let dir = tempdir().unwrap();
    let core = Core::open(dir.path());
    let task_id = core.refined_task().await;

    let first = core.orchestrator.dispatch(&task_id, "default", None).await.unwrap();
    core.wait_status(&task_id, TaskStatus::HandedOff).await;
    let seq_before = core.log.last_seq();

    // Same handoff digest: no new events, the existing session id returns.
    let second = core.orchestrator.dispatch(&task_id, "default", None).await.unwrap();
    assert!(second.reused);
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(core.log.last_seq(), seq_before);

    // Exactly one remote session was created.
    let creates = core
        .fake
        .calls()
        .iter()
        .filter(|c| matches!(c, cvr_adapters::BuilderCall::CreateSession { .. }))
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn every_notifying_event_has_exactly_one_inbox_item() {
    let dir = tempdir().unwrap();
    let core = Core::open(dir.path());
    let (task_id, session_id) = core.running_task().await;

    core.fake.push_event(
        &session_id,
        RemoteEvent::Gate { kind: "run".into(), detail: serde_json::Value::Null },
    );
    core.wait_status(&task_id, TaskStatus::AwaitingGate).await;
    core.orchestrator.resolve_gate(&task_id, true, None).await.unwrap();
    core.fake
        .push_event(&session_id, RemoteEvent::Failed { reason: "build broke".into() });
    core.wait_status(&task_id, TaskStatus::Failed).await;

    let view = core.log.snapshot();
    let mut sub = core.log.subscribe(0);
    let mut notifying = 0;
    for _ in 0..view.last_seq {
        let event = sub.recv().await;
        if cvr_core::inbox::severity_for(&event.body).is_some() {
            notifying += 1;
            // Exactly one item references this event.
            assert_eq!(
                view.inbox.iter().filter(|i| i.event_seq == event.seq).count(),
                1,
                "event {} should have exactly one inbox item",
                event.seq
            );
        }
    }
    assert_eq!(view.inbox.len(), notifying);
}
