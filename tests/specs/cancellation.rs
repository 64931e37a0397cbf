// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec: cancellation during a pending gate auto-denies it first.

use super::prelude::Core;
use cvr_adapters::{BuilderCall, RemoteEvent};
use cvr_core::event::{CancelPhase, EventBody};
use cvr_core::task::TaskStatus;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn cancel_during_gate() {
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

    core.orchestrator.cancel(&task_id, "never mind", None).await.unwrap();
    core.wait_status(&task_id, TaskStatus::Canceled).await;

    // The pending gate was auto-denied before the cancel event.
    let mut sub = core.log.subscribe(8);
    let denied = sub.recv().await;
    assert!(
        matches!(denied.body, EventBody::GateDenied { .. }),
        "expected auto GateDenied, got {:?}",
        denied.body
    );
    let pending = sub.recv().await;
    assert!(matches!(
        pending.body,
        EventBody::TaskCanceled { phase: CancelPhase::Pending, .. }
    ));

    // The remote abort endpoint was invoked, and the cooperative remote's
    // confirmation lands as the second cancel phase.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !core.fake.calls().iter().any(|c| matches!(c, BuilderCall::Abort { .. })) {
        assert!(tokio::time::Instant::now() < deadline, "abort never invoked");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let confirmation = sub.recv().await;
    assert!(matches!(
        confirmation.body,
        EventBody::TaskCanceled { phase: CancelPhase::Confirmed, .. }
    ));

    assert_eq!(core.status_of(&task_id), Some(TaskStatus::Canceled));
}

#[tokio::test]
async fn unconfirmed_abort_still_tears_down() {
    let dir = tempdir().unwrap();
    let core = Core::open(dir.path());
    core.fake.set_auto_confirm_abort(false);
    let (task_id, _session_id) = core.running_task().await;

    core.orchestrator.cancel(&task_id, "silence", None).await.unwrap();
    core.wait_status(&task_id, TaskStatus::Canceled).await;

    // After the bounded confirm window, the unconfirmed phase arrives and
    // the pool slot is free again.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let unconfirmed = core.log.with_state(|s| {
            s.inbox
                .iter()
                .any(|i| i.summary.contains("unconfirmed"))
        });
        if unconfirmed {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no unconfirmed phase");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(core.pool.live_count("default"), 0);
}
