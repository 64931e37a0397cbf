// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::orchestrator::{Orchestrator, QuickDispatchResult, RuntimeError};
use crate::DaemonPool;
use cvr_adapters::{
    BuilderCall, BuilderConfig, BuilderLimits, BuilderRegistry, BuilderTimeouts,
    FakeBuilderAdapter, RemoteEvent, SessionPool,
};
use cvr_core::event::EventBody;
use cvr_core::id::CommandId;
use cvr_core::task::TaskStatus;
use cvr_core::SystemClock;
use cvr_prompts::PromptWorkspace;
use cvr_storage::{CoreState, EventLog};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub(crate) struct Harness {
    pub orchestrator: Orchestrator,
    pub fake: FakeBuilderAdapter,
    pub log: EventLog,
    _dir: TempDir,
}

pub(crate) fn builder_config(kind: &str, max_sessions: usize) -> BuilderConfig {
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

pub(crate) fn harness() -> Harness {
    harness_with_capacity(4)
}

pub(crate) fn harness_with_capacity(max_sessions: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let log = EventLog::open(&dir.path().join("state/events.wal"), CoreState::default()).unwrap();

    let fake = FakeBuilderAdapter::new();
    let mut registry = BuilderRegistry::new();
    registry.register(builder_config("default", max_sessions), Arc::new(fake.clone()));

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let pool: Arc<DaemonPool> =
        Arc::new(SessionPool::new(registry, event_tx, SystemClock));

    // Observation forwarder, as the daemon wires it at startup.
    {
        let log = log.clone();
        tokio::spawn(async move {
            while let Some(proposed) = event_rx.recv().await {
                if let Err(e) = log.append(proposed) {
                    tracing::debug!(error = %e, "observation append rejected");
                }
            }
        });
    }

    let prompts = Arc::new(PromptWorkspace::new(dir.path().join("prompts")));
    let orchestrator = Orchestrator::new(log.clone(), prompts, pool);
    Harness { orchestrator, fake, log, _dir: dir }
}

/// Wait until the task reaches a status (events flow asynchronously).
pub(crate) async fn wait_status(log: &EventLog, task_id: &str, status: TaskStatus) {
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

/// Refine a fresh task up to ready_to_handoff. Returns the task id.
async fn refined_task(h: &Harness) -> String {
    let (task_id, _) = h
        .orchestrator
        .create_task("JWT refresh fix", Some("normal"), None)
        .unwrap();
    h.orchestrator
        .update_working_prompt(
            task_id.as_str(),
            "initial capture",
            "# JWT refresh fix\nfails after 15m idle",
            None,
        )
        .await
        .unwrap();
    h.orchestrator
        .raise_questions(
            task_id.as_str(),
            vec!["auto-refresh?".into(), "idle cap?".into()],
            None,
        )
        .unwrap();
    h.orchestrator
        .answer_questions(
            task_id.as_str(),
            serde_json::json!({"auto_refresh": true, "idle_cap_min": 30}),
            None,
        )
        .unwrap();
    h.orchestrator.freeze_prompt(task_id.as_str(), None, None).await.unwrap();
    task_id.as_str().to_string()
}

/// Refined and dispatched, with the builder reporting running.
async fn running_task(h: &Harness) -> String {
    let task_id = refined_task(h).await;
    let outcome = h.orchestrator.dispatch(&task_id, "default", None).await.unwrap();
    wait_status(&h.log, &task_id, TaskStatus::HandedOff).await;
    h.fake.push_event(
        outcome.session_id.as_str(),
        RemoteEvent::Status { status: "running".into(), reason: None },
    );
    wait_status(&h.log, &task_id, TaskStatus::Running).await;
    task_id
}

mod refinement {
    use super::*;

    #[tokio::test]
    async fn vague_request_to_handoff() {
        let h = harness();
        let task_id = refined_task(&h).await;

        // Events landed in order with the expected types.
        let mut sub = h.log.subscribe(0);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(sub.recv().await.body.type_str().to_string());
        }
        assert_eq!(
            seen,
            vec![
                "TaskCreated",
                "WorkingPromptUpdated",
                "QuestionsRaised",
                "UserAnswered",
                "HandoffFrozen"
            ]
        );

        let task = h.log.with_state(|s| s.find_task(&task_id).cloned()).unwrap();
        assert_eq!(task.status, TaskStatus::ReadyToHandoff);
        assert!(task.handoff_prompt_path.as_ref().unwrap().exists());
        assert!(task.handoff_spec_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn freeze_requires_refining_state() {
        let h = harness();
        let (task_id, _) = h.orchestrator.create_task("bare task", None, None).unwrap();
        let err = h.orchestrator.freeze_prompt(task_id.as_str(), None, None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn double_freeze_returns_same_paths_without_new_event() {
        let h = harness();
        let task_id = refined_task(&h).await;
        let seq_before = h.log.last_seq();

        let again = h.orchestrator.freeze_prompt(&task_id, None, None).await.unwrap();
        assert!(again.already_frozen);
        assert_eq!(h.log.last_seq(), seq_before);

        // Exactly one HandoffFrozen in the log.
        let mut sub = h.log.subscribe(0);
        let mut frozen_count = 0;
        for _ in 0..seq_before {
            if matches!(sub.recv().await.body, EventBody::HandoffFrozen { .. }) {
                frozen_count += 1;
            }
        }
        assert_eq!(frozen_count, 1);
    }

    #[tokio::test]
    async fn create_task_command_id_is_idempotent() {
        let h = harness();
        let cmd = CommandId::new("cmd-create-1");
        let (first, _) = h
            .orchestrator
            .create_task("same task", None, Some(cmd.clone()))
            .unwrap();
        let (second, _) = h.orchestrator.create_task("same task", None, Some(cmd)).unwrap();
        assert_eq!(first, second);
        assert_eq!(h.log.with_state(|s| s.tasks.len()), 1);
    }

    #[tokio::test]
    async fn colliding_titles_get_distinct_topics() {
        let h = harness();
        let (_, topic_a) = h.orchestrator.create_task("same title", None, None).unwrap();
        let (_, topic_b) = h.orchestrator.create_task("same title", None, None).unwrap();
        assert_ne!(topic_a, topic_b);
    }

    #[tokio::test]
    async fn link_external_is_idempotent_and_sticky() {
        let h = harness();
        let (task_id, _) = h.orchestrator.create_task("linked", None, None).unwrap();
        h.orchestrator.link_external(task_id.as_str(), "ext-1", None).unwrap();
        // Same value: no-op.
        h.orchestrator.link_external(task_id.as_str(), "ext-1", None).unwrap();
        // Different value: conflict.
        let err = h.orchestrator.link_external(task_id.as_str(), "ext-2", None).unwrap_err();
        assert!(matches!(err, RuntimeError::Append(cvr_storage::AppendError::Conflict(_))));
    }
}

mod dispatching {
    use super::*;

    #[tokio::test]
    async fn dispatch_gate_complete() {
        let h = harness();
        let task_id = running_task(&h).await;
        let session = h.log.with_state(|s| {
            s.find_task(&task_id).unwrap().builder_session_id.clone().unwrap()
        });

        h.fake.push_event(
            session.as_str(),
            RemoteEvent::Gate {
                kind: "write".into(),
                detail: serde_json::json!({"files": ["src/auth/mw.ts"]}),
            },
        );
        wait_status(&h.log, &task_id, TaskStatus::AwaitingGate).await;

        h.orchestrator.resolve_gate(&task_id, true, None).await.unwrap();
        wait_status(&h.log, &task_id, TaskStatus::Running).await;

        h.fake.push_event(
            session.as_str(),
            RemoteEvent::Completed {
                artifacts: vec![cvr_adapters::RemoteArtifact {
                    kind: "diff".into(),
                    path: "diff-2026-01-12.md".into(),
                }],
            },
        );
        wait_status(&h.log, &task_id, TaskStatus::Done).await;

        // Event order through the whole flow.
        let mut sub = h.log.subscribe(5); // after HandoffFrozen
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(sub.recv().await.body.type_str().to_string());
        }
        assert_eq!(
            seen,
            vec![
                "BuilderDispatched",
                "BuilderStatusChanged",
                "GateRequested",
                "GateApproved",
                "BuildCompleted"
            ]
        );

        // Inbox: one blocking (gate), one success (completion).
        let inbox = h.log.snapshot().inbox;
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].severity, cvr_core::inbox::Severity::Blocking);
        assert_eq!(inbox[1].severity, cvr_core::inbox::Severity::Success);
    }

    #[tokio::test]
    async fn duplicate_dispatch_is_idempotent() {
        let h = harness();
        let task_id = refined_task(&h).await;

        let first = h.orchestrator.dispatch(&task_id, "default", None).await.unwrap();
        wait_status(&h.log, &task_id, TaskStatus::HandedOff).await;
        let seq_before = h.log.last_seq();

        let second = h.orchestrator.dispatch(&task_id, "default", None).await.unwrap();
        assert!(second.reused);
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(h.log.last_seq(), seq_before);
    }

    #[tokio::test]
    async fn dispatch_requires_frozen_handoff() {
        let h = harness();
        let (task_id, _) = h.orchestrator.create_task("raw", None, None).unwrap();
        let err = h.orchestrator.dispatch(task_id.as_str(), "default", None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn gate_denial_returns_to_running() {
        let h = harness();
        let task_id = running_task(&h).await;
        let session = h.log.with_state(|s| {
            s.find_task(&task_id).unwrap().builder_session_id.clone().unwrap()
        });

        h.fake.push_event(
            session.as_str(),
            RemoteEvent::Gate { kind: "run".into(), detail: serde_json::Value::Null },
        );
        wait_status(&h.log, &task_id, TaskStatus::AwaitingGate).await;

        h.orchestrator.resolve_gate(&task_id, false, None).await.unwrap();
        wait_status(&h.log, &task_id, TaskStatus::Running).await;

        // The denial was forwarded to the remote.
        let forwarded = h.fake.calls().iter().any(|c| {
            matches!(c, BuilderCall::SendMessage { content, .. }
                if content.contains("gate_resolution") && content.contains("denied"))
        });
        assert!(forwarded);
    }

    #[tokio::test]
    async fn build_failure_lands_in_inbox() {
        let h = harness();
        let task_id = running_task(&h).await;
        let session = h.log.with_state(|s| {
            s.find_task(&task_id).unwrap().builder_session_id.clone().unwrap()
        });

        h.fake
            .push_event(session.as_str(), RemoteEvent::Failed { reason: "tests failed".into() });
        wait_status(&h.log, &task_id, TaskStatus::Failed).await;

        let inbox = h.log.snapshot().inbox;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].severity, cvr_core::inbox::Severity::Error);
        assert_eq!(inbox[0].detail.as_deref(), Some("tests failed"));
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancel_during_gate_denies_then_cancels() {
        let h = harness();
        let task_id = running_task(&h).await;
        let session = h.log.with_state(|s| {
            s.find_task(&task_id).unwrap().builder_session_id.clone().unwrap()
        });

        h.fake.push_event(
            session.as_str(),
            RemoteEvent::Gate { kind: "write".into(), detail: serde_json::Value::Null },
        );
        wait_status(&h.log, &task_id, TaskStatus::AwaitingGate).await;

        h.orchestrator.cancel(&task_id, "never mind", None).await.unwrap();
        wait_status(&h.log, &task_id, TaskStatus::Canceled).await;

        // Remote abort was invoked.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !h.fake.calls().iter().any(|c| matches!(c, BuilderCall::Abort { .. })) {
            assert!(tokio::time::Instant::now() < deadline, "abort never invoked");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Event tail: GateDenied (auto), TaskCanceled pending, then the
        // confirmation.
        let mut sub = h.log.subscribe(8); // after GateRequested
        let denied = sub.recv().await;
        assert!(matches!(denied.body, EventBody::GateDenied { .. }));
        let pending = sub.recv().await;
        assert!(matches!(
            pending.body,
            EventBody::TaskCanceled { phase: cvr_core::event::CancelPhase::Pending, .. }
        ));
        let confirmation = sub.recv().await;
        assert!(matches!(
            confirmation.body,
            EventBody::TaskCanceled { phase: cvr_core::event::CancelPhase::Confirmed, .. }
        ));
    }

    #[tokio::test]
    async fn cancel_unconfirmed_when_remote_silent() {
        let h = harness();
        h.fake.set_auto_confirm_abort(false);
        let task_id = running_task(&h).await;

        h.orchestrator.cancel(&task_id, "gone quiet", None).await.unwrap();
        wait_status(&h.log, &task_id, TaskStatus::Canceled).await;

        // Unconfirmed phase arrives after the bounded wait; it carries
        // warning severity in the inbox.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let unconfirmed = h.log.with_state(|s| {
                s.inbox
                    .iter()
                    .any(|i| i.severity == cvr_core::inbox::Severity::Warning)
            });
            if unconfirmed {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "no unconfirmed warning");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn cancel_terminal_task_rejected() {
        let h = harness();
        let (task_id, _) = h.orchestrator.create_task("to cancel", None, None).unwrap();
        h.orchestrator.cancel(task_id.as_str(), "first", None).await.unwrap();
        wait_status(&h.log, task_id.as_str(), TaskStatus::Canceled).await;

        let err = h.orchestrator.cancel(task_id.as_str(), "again", None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidState(_)));
    }
}

mod quick_dispatch {
    use super::*;

    #[tokio::test]
    async fn quick_dispatch_executes_end_to_end() {
        let h = harness();
        let result = h
            .orchestrator
            .quick_dispatch("rename flag", "rename --force to --yes", "default", None, None)
            .await
            .unwrap();

        let QuickDispatchResult::Executed { task_id, session_id } = result else {
            panic!("expected executed");
        };
        wait_status(&h.log, task_id.as_str(), TaskStatus::HandedOff).await;

        // The trio: requested then executed, no blocked.
        let mut sub = h.log.subscribe(0);
        let mut requested = false;
        let mut executed = false;
        let last = h.log.last_seq();
        for _ in 0..last {
            match sub.recv().await.body {
                EventBody::QuickDispatchRequested { .. } => requested = true,
                EventBody::QuickDispatchExecuted { session_id: s } => {
                    executed = true;
                    assert_eq!(s, session_id);
                }
                EventBody::QuickDispatchBlocked { .. } => panic!("unexpected block"),
                _ => {}
            }
        }
        assert!(requested && executed);
    }

    #[tokio::test]
    async fn quick_dispatch_blocked_on_unknown_builder() {
        let h = harness();
        let result = h
            .orchestrator
            .quick_dispatch("task", "prompt", "mystery", None, None)
            .await
            .unwrap();
        let QuickDispatchResult::Blocked { task_id, reason } = result else {
            panic!("expected blocked");
        };
        assert!(reason.contains("unknown builder"));

        // Task remains non-terminal for a later manual path, and the block
        // is visible in the inbox as a warning.
        let task = h.log.with_state(|s| s.tasks.get(&task_id).cloned()).unwrap();
        assert!(!task.is_terminal());
        let inbox = h.log.snapshot().inbox;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].severity, cvr_core::inbox::Severity::Warning);
    }

    #[tokio::test]
    async fn quick_dispatch_blocked_at_capacity() {
        let h = harness_with_capacity(1);
        // Fill the only slot.
        let first = h
            .orchestrator
            .quick_dispatch("one", "first prompt", "default", None, None)
            .await
            .unwrap();
        assert!(matches!(first, QuickDispatchResult::Executed { .. }));

        let second = h
            .orchestrator
            .quick_dispatch("two", "second prompt", "default", None, None)
            .await
            .unwrap();
        let QuickDispatchResult::Blocked { reason, .. } = second else {
            panic!("expected blocked");
        };
        assert!(reason.contains("capacity"));
    }

    #[tokio::test]
    async fn quick_dispatch_blocked_on_destructive_contract() {
        let h = harness();
        let spec = cvr_core::HandoffSpec::new("retire the legacy tables").gates(
            cvr_core::GateFlags { write: true, run: true, destructive: true },
        );
        let result = h
            .orchestrator
            .quick_dispatch("drop tables", "drop the legacy tables", "default", Some(spec), None)
            .await
            .unwrap();
        let QuickDispatchResult::Blocked { task_id, reason } = result else {
            panic!("expected blocked");
        };
        assert!(reason.contains("destructive"));

        // Nothing was frozen or sent to a builder; the task stays open for
        // the full refine-and-review path.
        let task = h.log.with_state(|s| s.tasks.get(&task_id).cloned()).unwrap();
        assert!(task.handoff_prompt_path.is_none());
        assert!(!task.is_terminal());
        assert!(h
            .fake
            .calls()
            .iter()
            .all(|c| !matches!(c, BuilderCall::CreateSession { .. })));
    }

    #[tokio::test]
    async fn quick_dispatch_freezes_the_supplied_contract() {
        let h = harness();
        let spec = cvr_core::HandoffSpec::new("tidy the imports")
            .gates(cvr_core::GateFlags { write: true, run: false, destructive: false });
        let result = h
            .orchestrator
            .quick_dispatch("tidy", "tidy the imports", "default", Some(spec.clone()), None)
            .await
            .unwrap();
        let QuickDispatchResult::Executed { task_id, .. } = result else {
            panic!("expected executed");
        };
        wait_status(&h.log, task_id.as_str(), TaskStatus::HandedOff).await;

        let json_path = h
            .log
            .with_state(|s| s.tasks.get(&task_id).unwrap().handoff_spec_path.clone())
            .unwrap();
        let frozen: cvr_core::HandoffSpec =
            serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(frozen, spec);
    }
}
