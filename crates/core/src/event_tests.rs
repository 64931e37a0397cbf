// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::{CommandId, TaskId};
use crate::session::SessionId;
use crate::task::Priority;
use chrono::Utc;

fn sample_event() -> Event {
    ProposedEvent::new(
        TaskId::from_string("tsk-1"),
        EventBody::TaskCreated {
            title: "JWT refresh fix".into(),
            priority: Priority::Normal,
            topic: TopicSlug::new("jwt-refresh-fix"),
        },
    )
    .into_event(1, Utc::now())
}

#[test]
fn envelope_shape_is_stable() {
    let json = serde_json::to_value(sample_event()).unwrap();
    assert_eq!(json["seq"], 1);
    assert_eq!(json["type"], "TaskCreated");
    assert_eq!(json["task_id"], "tsk-1");
    assert_eq!(json["payload"]["title"], "JWT refresh fix");
    assert_eq!(json["payload"]["priority"], "normal");
    assert!(json.get("refs").is_none());
    assert!(json.get("time").is_some());
}

#[test]
fn type_strings_match_serde_tags() {
    let bodies = [
        EventBody::TaskCreated {
            title: "t".into(),
            priority: Priority::Low,
            topic: TopicSlug::new("t"),
        },
        EventBody::WorkingPromptUpdated { delta_summary: "d".into(), path: "p".into() },
        EventBody::QuestionsRaised { questions: vec![] },
        EventBody::UserAnswered { answers: serde_json::Value::Null },
        EventBody::HandoffFrozen {
            topic: TopicSlug::new("t"),
            handoff_md_path: "m".into(),
            handoff_json_path: "j".into(),
            digest: "d".into(),
        },
        EventBody::ExternalTaskLinked { external_task_id: "e".into() },
        EventBody::BuilderDispatched {
            builder_kind: "k".into(),
            session_id: SessionId::new("s"),
            dispatch_token: "t".into(),
        },
        EventBody::BuilderStatusChanged {
            status: crate::session::SessionStatus::Running,
            reason: None,
        },
        EventBody::GateRequested {
            gate: crate::handoff::GateKind::Write,
            detail: serde_json::Value::Null,
        },
        EventBody::GateApproved { gate: crate::handoff::GateKind::Run },
        EventBody::GateDenied { gate: crate::handoff::GateKind::Run, reason: None },
        EventBody::BuildCompleted { artifacts: vec![] },
        EventBody::BuildFailed { reason: "r".into() },
        EventBody::TaskCanceled { reason: "r".into(), phase: CancelPhase::Pending },
        EventBody::QuickDispatchRequested { builder_kind: "k".into(), summary: "s".into() },
        EventBody::QuickDispatchExecuted { session_id: SessionId::new("s") },
        EventBody::QuickDispatchBlocked { reason: "r".into() },
    ];
    for body in bodies {
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], body.type_str(), "tag mismatch for {:?}", body);
    }
}

#[test]
fn event_roundtrips() {
    let event = ProposedEvent::new(
        TaskId::from_string("tsk-2"),
        EventBody::GateRequested {
            gate: crate::handoff::GateKind::Write,
            detail: serde_json::json!({"files": ["src/auth/mw.ts"]}),
        },
    )
    .with_refs(EventRefs {
        session_id: Some(SessionId::new("s1")),
        ..EventRefs::default()
    })
    .into_event(7, Utc::now());

    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(event, back);
}

#[test]
fn command_id_lives_in_refs() {
    let event = ProposedEvent::new(
        TaskId::from_string("tsk-3"),
        EventBody::BuildFailed { reason: "r".into() },
    )
    .with_command_id(Some(CommandId::new("cmd-9")))
    .into_event(2, Utc::now());

    assert_eq!(event.command_id().map(CommandId::as_str), Some("cmd-9"));
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["refs"]["command_id"], "cmd-9");
}

#[test]
fn empty_refs_are_omitted() {
    let event = ProposedEvent::new(
        TaskId::from_string("tsk-4"),
        EventBody::BuildCompleted { artifacts: vec![] },
    )
    .with_refs(EventRefs::default())
    .into_event(3, Utc::now());
    let json = serde_json::to_value(&event).unwrap();
    assert!(json.get("refs").is_none());
}
