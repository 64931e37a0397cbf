// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests: replaying any event sequence is deterministic and
//! incremental application matches wholesale replay.

use super::*;
use proptest::prelude::*;

fn arb_body() -> impl Strategy<Value = EventBody> {
    prop_oneof![
        Just(created()),
        ".{0,20}".prop_map(|s| EventBody::WorkingPromptUpdated {
            delta_summary: s,
            path: "prompts/t/working.md".into(),
        }),
        prop::collection::vec(".{0,10}", 0..3)
            .prop_map(|questions| EventBody::QuestionsRaised { questions }),
        Just(EventBody::UserAnswered { answers: serde_json::json!({"ok": true}) }),
        Just(EventBody::HandoffFrozen {
            topic: TopicSlug::new("jwt-refresh-fix"),
            handoff_md_path: "prompts/t/handoff.md".into(),
            handoff_json_path: "prompts/t/handoff.json".into(),
            digest: "d".into(),
        }),
        Just(dispatched()),
        prop_oneof![
            Just(SessionStatus::Running),
            Just(SessionStatus::Paused),
            Just(SessionStatus::Lost),
        ]
        .prop_map(|status| EventBody::BuilderStatusChanged { status, reason: None }),
        Just(EventBody::GateRequested {
            gate: GateKind::Write,
            detail: serde_json::Value::Null
        }),
        Just(EventBody::GateApproved { gate: GateKind::Write }),
        Just(EventBody::GateDenied { gate: GateKind::Write, reason: None }),
        Just(EventBody::BuildCompleted { artifacts: vec![] }),
        ".{0,20}".prop_map(|reason| EventBody::BuildFailed { reason }),
        prop_oneof![
            Just(CancelPhase::Pending),
            Just(CancelPhase::Confirmed),
            Just(CancelPhase::Unconfirmed),
        ]
        .prop_map(|phase| EventBody::TaskCanceled { reason: "r".into(), phase }),
        ".{0,20}".prop_map(|reason| EventBody::QuickDispatchBlocked { reason }),
    ]
}

fn arb_events() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(arb_body(), 0..25).prop_map(|bodies| {
        bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| event(i as u64 + 1, body))
            .collect()
    })
}

proptest! {
    /// Replaying the same sequence twice yields identical state.
    #[test]
    fn replay_is_deterministic(events in arb_events()) {
        let a = replay(&events);
        let b = replay(&events);
        prop_assert_eq!(a, b);
    }

    /// Incremental application equals wholesale replay at every prefix.
    #[test]
    fn incremental_matches_replay(events in arb_events()) {
        let mut incremental = CoreState::default();
        for (i, e) in events.iter().enumerate() {
            incremental.apply_event(e);
            let wholesale = replay(&events[..=i]);
            prop_assert_eq!(&incremental, &wholesale, "diverged at seq {}", e.seq);
        }
    }

    /// Double-applying every event changes nothing.
    #[test]
    fn double_apply_is_noop(events in arb_events()) {
        let once = replay(&events);
        let mut twice = CoreState::default();
        for e in &events {
            twice.apply_event(e);
            twice.apply_event(e);
        }
        prop_assert_eq!(once, twice);
    }

    /// At most one live session per task, at every point in the sequence.
    #[test]
    fn at_most_one_live_session(events in arb_events()) {
        let mut state = CoreState::default();
        for e in &events {
            state.apply_event(e);
            let live = state
                .sessions
                .values()
                .filter(|s| s.task_id.as_str() == "tsk-state-test-1" && s.is_live())
                .count();
            prop_assert!(live <= 1);
        }
    }
}
