// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::reconcile_state;
use crate::DaemonPool;
use cvr_adapters::{
    BuilderConfig, BuilderLimits, BuilderRegistry, BuilderTimeouts, FakeBuilderAdapter,
    RemoteEvent, SessionHealth, SessionPool,
};
use cvr_core::event::{EventBody, EventRefs, ProposedEvent};
use cvr_core::id::{TaskId, TopicSlug};
use cvr_core::session::SessionId;
use cvr_core::task::{Priority, TaskStatus};
use cvr_core::SystemClock;
use cvr_storage::{CoreState, EventLog};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn builder_config(kind: &str, max_sessions: usize) -> BuilderConfig {
    BuilderConfig {
        name: format!("{}-builder", kind),
        kind: kind.to_string(),
        endpoint: "127.0.0.1:9900".into(),
        default_model: None,
        auth_token: None,
        timeouts: BuilderTimeouts {
            create_s: 5,
            send_s: 5,
            stream_idle_s: 60,
            abort_confirm_s: 2,
        },
        limits: BuilderLimits { max_sessions, max_reconnects: 2, reconnect_window_s: 60 },
    }
}

async fn wait_status(log: &EventLog, task_id: &str, status: TaskStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let current = log.with_state(|s| s.find_task(task_id).map(|t| t.status));
        if current == Some(status) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("task {} never reached {:?}, at {:?}", task_id, status, current);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct Harness {
    pool: Arc<DaemonPool>,
    fake: FakeBuilderAdapter,
    log: EventLog,
    dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(&dir.path().join("events.wal"), CoreState::default()).unwrap();

    let fake = FakeBuilderAdapter::new();
    let mut registry = BuilderRegistry::new();
    registry.register(builder_config("default", 4), Arc::new(fake.clone()));

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let pool: Arc<DaemonPool> = Arc::new(
        SessionPool::new(registry, event_tx, SystemClock)
            .with_cursor_dir(dir.path().join("cursors")),
    );
    {
        let log = log.clone();
        tokio::spawn(async move {
            while let Some(proposed) = event_rx.recv().await {
                let _ = log.append(proposed);
            }
        });
    }

    Harness { pool, fake, log, dir }
}

/// Persist the event trail of a task that was running when the previous
/// process died.
fn seed_running_task(log: &EventLog, session: &str) -> TaskId {
    let task_id = TaskId::from_string("tsk-recover-1");
    let events = [
        EventBody::TaskCreated {
            title: "interrupted".into(),
            priority: Priority::Normal,
            topic: TopicSlug::new("interrupted"),
        },
        EventBody::WorkingPromptUpdated { delta_summary: "d".into(), path: "p".into() },
        EventBody::HandoffFrozen {
            topic: TopicSlug::new("interrupted"),
            handoff_md_path: "m".into(),
            handoff_json_path: "j".into(),
            digest: "dg".into(),
        },
        EventBody::BuilderDispatched {
            builder_kind: "default".into(),
            session_id: SessionId::new(session),
            dispatch_token: "tok".into(),
        },
        EventBody::BuilderStatusChanged {
            status: cvr_core::session::SessionStatus::Running,
            reason: None,
        },
    ];
    for body in events {
        log.append(
            ProposedEvent::new(task_id, body).with_refs(EventRefs {
                session_id: Some(SessionId::new(session)),
                ..EventRefs::default()
            }),
        )
        .unwrap();
    }
    task_id
}

#[tokio::test]
async fn still_running_session_resumes_stream() {
    let h = harness();
    let task_id = seed_running_task(&h.log, "bs-1");
    h.fake.set_health("bs-1", SessionHealth::Running);

    reconcile_state(&h.pool, &h.log, &h.dir.path().join("cursors")).await;

    // Stream reopened; a pushed completion flows through to done.
    h.fake.push_event("bs-1", RemoteEvent::Completed { artifacts: vec![] });
    wait_status(&h.log, task_id.as_str(), TaskStatus::Done).await;
}

#[tokio::test]
async fn remotely_completed_session_synthesizes_terminal_event() {
    let h = harness();
    let task_id = seed_running_task(&h.log, "bs-1");
    h.fake.set_health(
        "bs-1",
        SessionHealth::Terminal { status: "completed".into(), reason: None },
    );

    reconcile_state(&h.pool, &h.log, &h.dir.path().join("cursors")).await;
    wait_status(&h.log, task_id.as_str(), TaskStatus::Done).await;
}

#[tokio::test]
async fn remotely_failed_session_synthesizes_failure() {
    let h = harness();
    let task_id = seed_running_task(&h.log, "bs-1");
    h.fake.set_health(
        "bs-1",
        SessionHealth::Terminal { status: "failed".into(), reason: Some("oom".into()) },
    );

    reconcile_state(&h.pool, &h.log, &h.dir.path().join("cursors")).await;
    wait_status(&h.log, task_id.as_str(), TaskStatus::Failed).await;

    let reason = h.log.with_state(|s| {
        s.inbox.iter().find_map(|i| i.detail.clone())
    });
    assert_eq!(reason.as_deref(), Some("oom"));
}

#[tokio::test]
async fn gone_session_marks_task_failed_with_lost_status() {
    let h = harness();
    let task_id = seed_running_task(&h.log, "bs-vanished");
    // No health scripted: the fake answers Gone.

    reconcile_state(&h.pool, &h.log, &h.dir.path().join("cursors")).await;
    wait_status(&h.log, task_id.as_str(), TaskStatus::Failed).await;

    // The lost observation and the failure both landed.
    let mut sub = h.log.subscribe(5);
    let lost = sub.recv().await;
    assert!(matches!(
        lost.body,
        EventBody::BuilderStatusChanged {
            status: cvr_core::session::SessionStatus::Lost,
            ..
        }
    ));
    let failed = sub.recv().await;
    assert!(matches!(failed.body, EventBody::BuildFailed { .. }));
}

#[tokio::test]
async fn terminal_tasks_are_not_reconciled() {
    let h = harness();
    let task_id = seed_running_task(&h.log, "bs-1");
    h.log
        .append(ProposedEvent::new(
            task_id,
            EventBody::BuildFailed { reason: "already settled".into() },
        ))
        .unwrap();
    let seq_before = h.log.last_seq();

    reconcile_state(&h.pool, &h.log, &h.dir.path().join("cursors")).await;

    assert!(h.fake.calls().is_empty());
    assert_eq!(h.log.last_seq(), seq_before);
}
