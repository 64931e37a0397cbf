// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event::CancelPhase;
use crate::handoff::GateKind;

#[test]
fn notifying_events_map_to_severities() {
    assert_eq!(
        severity_for(&EventBody::BuildCompleted { artifacts: vec![] }),
        Some(Severity::Success)
    );
    assert_eq!(
        severity_for(&EventBody::BuildFailed { reason: "r".into() }),
        Some(Severity::Error)
    );
    assert_eq!(
        severity_for(&EventBody::GateRequested {
            gate: GateKind::Write,
            detail: serde_json::Value::Null
        }),
        Some(Severity::Blocking)
    );
    assert_eq!(
        severity_for(&EventBody::TaskCanceled {
            reason: "r".into(),
            phase: CancelPhase::Confirmed
        }),
        Some(Severity::Info)
    );
    assert_eq!(
        severity_for(&EventBody::TaskCanceled {
            reason: "r".into(),
            phase: CancelPhase::Unconfirmed
        }),
        Some(Severity::Warning)
    );
    assert_eq!(
        severity_for(&EventBody::BuilderStatusChanged {
            status: SessionStatus::Lost,
            reason: None
        }),
        Some(Severity::Warning)
    );
    assert_eq!(
        severity_for(&EventBody::QuickDispatchBlocked { reason: "r".into() }),
        Some(Severity::Warning)
    );
}

#[test]
fn silent_events_produce_nothing() {
    assert_eq!(
        severity_for(&EventBody::TaskCanceled { reason: "r".into(), phase: CancelPhase::Pending }),
        None
    );
    assert_eq!(
        severity_for(&EventBody::BuilderStatusChanged {
            status: SessionStatus::Running,
            reason: None
        }),
        None
    );
    assert_eq!(severity_for(&EventBody::GateApproved { gate: GateKind::Write }), None);
}

#[test]
fn blocking_sorts_highest() {
    assert!(Severity::Blocking > Severity::Error);
    assert!(Severity::Error > Severity::Warning);
    assert!(Severity::Warning > Severity::Success);
    assert!(Severity::Success > Severity::Info);
}

#[test]
fn summaries_clamp_to_140() {
    let long = "x".repeat(500);
    let clamped = clamp_summary(&long);
    assert_eq!(clamped.chars().count(), SUMMARY_MAX);
    assert!(clamped.ends_with('…'));

    assert_eq!(clamp_summary("short"), "short");
}
