// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec: subscriber resume.
//!
//! A subscriber that disconnects and reconnects with its last-seen seq
//! receives exactly the missed events, in order, and its union with what
//! it already saw equals an always-online subscriber's full sequence.

use super::prelude::Core;
use cvr_adapters::RemoteEvent;
use cvr_core::task::TaskStatus;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn resumed_subscriber_sees_union_equal_to_online_one() {
    let dir = tempdir().unwrap();
    let core = Core::open(dir.path());

    // Both subscribers connect before anything happens.
    let mut sub_a = core.log.subscribe(0);
    let mut sub_b = core.log.subscribe(0);

    let (task_id, session_id) = core.running_task().await;

    // B consumes through BuilderDispatched (seq 6) then disconnects.
    let mut b_seen = Vec::new();
    for _ in 0..6 {
        let event = sub_b.recv().await;
        b_seen.push((event.seq, event.body.type_str().to_string()));
    }
    let b_cursor = b_seen.last().map(|(seq, _)| *seq).unwrap();
    drop(sub_b);

    // The flow continues while B is away.
    core.fake.push_event(
        &session_id,
        RemoteEvent::Gate {
            kind: "write".into(),
            detail: serde_json::json!({"files": ["src/auth/mw.ts"]}),
        },
    );
    core.wait_status(&task_id, TaskStatus::AwaitingGate).await;
    core.orchestrator.resolve_gate(&task_id, true, None).await.unwrap();
    core.fake.push_event(&session_id, RemoteEvent::Completed { artifacts: vec![] });
    core.wait_status(&task_id, TaskStatus::Done).await;

    let total = core.log.last_seq();

    // A saw everything, in order, gap-free.
    let mut a_seen = Vec::new();
    for _ in 0..total {
        let event = tokio::time::timeout(Duration::from_secs(2), sub_a.recv())
            .await
            .expect("subscriber A timed out");
        a_seen.push((event.seq, event.body.type_str().to_string()));
    }
    let seqs: Vec<u64> = a_seen.iter().map(|(s, _)| *s).collect();
    assert_eq!(seqs, (1..=total).collect::<Vec<_>>());

    // B reconnects with its last seq and receives exactly the missed tail.
    let mut sub_b2 = core.log.subscribe(b_cursor);
    let mut b_tail = Vec::new();
    for _ in 0..(total - b_cursor) {
        let event = tokio::time::timeout(Duration::from_secs(2), sub_b2.recv())
            .await
            .expect("subscriber B timed out");
        b_tail.push((event.seq, event.body.type_str().to_string()));
    }
    assert_eq!(
        b_tail.first().map(|(_, t)| t.as_str()),
        Some("BuilderStatusChanged"),
        "resume starts at the first missed event"
    );

    // Union equals A's full view.
    b_seen.extend(b_tail);
    assert_eq!(b_seen, a_seen);
}

#[tokio::test]
async fn two_fresh_subscribers_observe_identical_sequences() {
    let dir = tempdir().unwrap();
    let core = Core::open(dir.path());
    let _ = core.refined_task().await;

    let total = core.log.last_seq();
    let mut first = Vec::new();
    let mut second = Vec::new();
    let mut sub1 = core.log.subscribe(0);
    let mut sub2 = core.log.subscribe(0);
    for _ in 0..total {
        first.push(sub1.recv().await.seq);
        second.push(sub2.recv().await.seq);
    }
    assert_eq!(first, second);
}
