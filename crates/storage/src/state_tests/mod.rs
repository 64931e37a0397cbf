// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use cvr_core::event::{CancelPhase, EventRefs};
use cvr_core::handoff::GateKind;
use cvr_core::id::TopicSlug;
use cvr_core::session::{ArtifactPointer, SessionId, SessionStatus};
use cvr_core::task::{Priority, TaskStatus};

mod determinism;

fn task_id() -> TaskId {
    TaskId::from_string("tsk-state-test-1")
}

fn event(seq: u64, body: EventBody) -> Event {
    event_with_refs(seq, body, None)
}

fn event_with_refs(seq: u64, body: EventBody, refs: Option<EventRefs>) -> Event {
    Event {
        seq,
        time: Utc.timestamp_millis_opt(1_700_000_000_000 + seq as i64 * 1000).unwrap(),
        task_id: Some(task_id()),
        refs,
        body,
    }
}

fn created() -> EventBody {
    EventBody::TaskCreated {
        title: "JWT refresh fix".into(),
        priority: Priority::Normal,
        topic: TopicSlug::new("jwt-refresh-fix"),
    }
}

fn dispatched() -> EventBody {
    EventBody::BuilderDispatched {
        builder_kind: "default".into(),
        session_id: SessionId::new("bs-1"),
        dispatch_token: "tok-1".into(),
    }
}

/// The canonical dispatch-gate-complete event sequence from the design
/// scenarios, used by several tests below.
fn scenario_events() -> Vec<Event> {
    vec![
        event(1, created()),
        event(
            2,
            EventBody::WorkingPromptUpdated {
                delta_summary: "initial capture".into(),
                path: "prompts/jwt-refresh-fix/working.md".into(),
            },
        ),
        event(3, EventBody::QuestionsRaised { questions: vec!["auto-refresh?".into()] }),
        event(4, EventBody::UserAnswered { answers: serde_json::json!({"auto_refresh": true}) }),
        event(
            5,
            EventBody::HandoffFrozen {
                topic: TopicSlug::new("jwt-refresh-fix"),
                handoff_md_path: "prompts/jwt-refresh-fix/handoff.md".into(),
                handoff_json_path: "prompts/jwt-refresh-fix/handoff.json".into(),
                digest: "abc123".into(),
            },
        ),
        event(6, dispatched()),
        event(
            7,
            EventBody::BuilderStatusChanged { status: SessionStatus::Running, reason: None },
        ),
        event(
            8,
            EventBody::GateRequested {
                gate: GateKind::Write,
                detail: serde_json::json!({"files": ["src/auth/mw.ts"]}),
            },
        ),
        event(9, EventBody::GateApproved { gate: GateKind::Write }),
        event(
            10,
            EventBody::BuildCompleted {
                artifacts: vec![ArtifactPointer {
                    kind: "diff".into(),
                    path: "prompts/jwt-refresh-fix/artifacts/diff.md".into(),
                    created_at_ms: 0,
                }],
            },
        ),
    ]
}

fn replay(events: &[Event]) -> CoreState {
    let mut state = CoreState::default();
    for e in events {
        state.apply_event(e);
    }
    state
}

#[test]
fn task_created_materializes_draft() {
    let state = replay(&[event(1, created())]);
    let task = state.get_task("tsk-state-test-1").unwrap();
    assert_eq!(task.status, TaskStatus::Draft);
    assert_eq!(task.title, "JWT refresh fix");
    assert_eq!(task.last_event_seq, 1);
    assert!(state.topics.contains_key("jwt-refresh-fix"));
}

#[test]
fn full_scenario_reaches_done() {
    let state = replay(&scenario_events());
    let task = state.get_task("tsk-state-test-1").unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.last_event_seq, 10);
    assert_eq!(
        task.handoff_prompt_path.as_deref(),
        Some(std::path::Path::new("prompts/jwt-refresh-fix/handoff.md"))
    );

    let session = state.sessions.get("bs-1").unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.artifacts.len(), 1);
    assert!(session.ended_at_ms.is_some());
}

#[test]
fn status_tracks_most_recent_applicable_event() {
    let events = scenario_events();
    let mut state = CoreState::default();
    let expected = [
        TaskStatus::Draft,
        TaskStatus::Refining,
        TaskStatus::AwaitingUser,
        TaskStatus::Refining,
        TaskStatus::ReadyToHandoff,
        TaskStatus::HandedOff,
        TaskStatus::Running,
        TaskStatus::AwaitingGate,
        TaskStatus::Running,
        TaskStatus::Done,
    ];
    for (e, want) in events.iter().zip(expected) {
        state.apply_event(e);
        assert_eq!(state.get_task("tsk-state-test-1").unwrap().status, want, "after seq {}", e.seq);
    }
}

#[test]
fn apply_is_idempotent() {
    let events = scenario_events();
    let once = replay(&events);

    let mut twice = CoreState::default();
    for e in &events {
        twice.apply_event(e);
        twice.apply_event(e);
    }
    similar_asserts::assert_eq!(once, twice);
}

#[test]
fn freeze_recorded_once_per_topic() {
    let mut events = scenario_events();
    // Replay a duplicate freeze with a different digest: it must not win.
    let mut dup = events[4].clone();
    if let EventBody::HandoffFrozen { digest, .. } = &mut dup.body {
        *digest = "different".into();
    }
    dup.seq = 11;
    events.push(dup);

    let state = replay(&events);
    let frozen = state.topics.get("jwt-refresh-fix").unwrap().frozen.as_ref().unwrap();
    assert_eq!(frozen.digest, "abc123");
    assert_eq!(frozen.seq, 5);
}

#[test]
fn external_id_never_reassigned() {
    let events = vec![
        event(1, created()),
        event(2, EventBody::ExternalTaskLinked { external_task_id: "ext-1".into() }),
        event(3, EventBody::ExternalTaskLinked { external_task_id: "ext-2".into() }),
    ];
    let state = replay(&events);
    assert_eq!(
        state.get_task("tsk-state-test-1").unwrap().external_task_id.as_deref(),
        Some("ext-1")
    );
}

#[test]
fn lost_builder_recorded_as_failed_session() {
    let mut events = scenario_events();
    events.truncate(7); // through BuilderStatusChanged(running)
    events.push(event(
        8,
        EventBody::BuilderStatusChanged {
            status: SessionStatus::Lost,
            reason: Some("health check failed".into()),
        },
    ));
    let state = replay(&events);
    let session = state.sessions.get("bs-1").unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.ended_at_ms.is_some());
}

#[test]
fn cancel_resolution_aborts_session() {
    let mut events = scenario_events();
    events.truncate(7);
    events.push(event(
        8,
        EventBody::TaskCanceled { reason: "never mind".into(), phase: CancelPhase::Pending },
    ));
    let mid = replay(&events);
    // Pending leaves the session live for the abort path.
    assert!(mid.sessions.get("bs-1").unwrap().is_live());

    events.push(event(
        9,
        EventBody::TaskCanceled { reason: "never mind".into(), phase: CancelPhase::Confirmed },
    ));
    let done = replay(&events);
    assert_eq!(done.sessions.get("bs-1").unwrap().status, SessionStatus::Aborted);
    assert_eq!(done.get_task("tsk-state-test-1").unwrap().status, TaskStatus::Canceled);
}

mod inbox_derivation {
    use super::*;

    #[test]
    fn notifying_events_create_exactly_one_item() {
        let state = replay(&scenario_events());
        // Gate request (blocking) + completion (success).
        assert_eq!(state.inbox.len(), 2);
        assert_eq!(state.inbox[0].event_seq, 8);
        assert_eq!(state.inbox[0].severity, cvr_core::inbox::Severity::Blocking);
        assert_eq!(state.inbox[1].event_seq, 10);
        assert_eq!(state.inbox[1].severity, cvr_core::inbox::Severity::Success);
    }

    #[test]
    fn items_reference_their_event_and_task() {
        let state = replay(&scenario_events());
        for item in &state.inbox {
            assert!(item.event_seq <= state.last_seq);
            assert_eq!(item.task_id, Some(task_id()));
            assert!(item.summary.chars().count() <= cvr_core::inbox::SUMMARY_MAX);
        }
    }

    #[test]
    fn item_ids_are_deterministic() {
        let a = replay(&scenario_events());
        let b = replay(&scenario_events());
        let ids_a: Vec<_> = a.inbox.iter().map(|i| i.id).collect();
        let ids_b: Vec<_> = b.inbox.iter().map(|i| i.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn unread_count_follows_read_marks() {
        let mut state = replay(&scenario_events());
        assert_eq!(state.unread_count(), 2);
        let id = state.inbox[0].id;
        for item in state.inbox.iter_mut() {
            if item.id == id {
                item.read_at_ms = Some(1);
            }
        }
        assert_eq!(state.unread_count(), 1);
    }
}

mod commands {
    use super::*;
    use cvr_core::id::CommandId;

    #[test]
    fn first_event_for_a_command_id_wins() {
        let refs = EventRefs::command(CommandId::new("cmd-1"));
        let events = vec![
            event_with_refs(1, created(), Some(refs.clone())),
            event_with_refs(
                2,
                EventBody::WorkingPromptUpdated {
                    delta_summary: "d".into(),
                    path: "p".into(),
                },
                Some(refs),
            ),
        ];
        let state = replay(&events);
        let record = state.command_outcome(&CommandId::new("cmd-1")).unwrap();
        assert_eq!(record.seq, 1);
        assert_eq!(record.task_id, Some(task_id()));
    }
}
