// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec: a vague spoken request is refined into an immutable handoff.

use super::prelude::Core;
use cvr_core::task::TaskStatus;
use tempfile::tempdir;

#[tokio::test]
async fn vague_request_to_handoff() {
    let dir = tempdir().unwrap();
    let core = Core::open(dir.path());

    let task_id = core.refined_task().await;

    let types = core.event_types_after(0, 5).await;
    assert_eq!(
        types,
        vec![
            "TaskCreated",
            "WorkingPromptUpdated",
            "QuestionsRaised",
            "UserAnswered",
            "HandoffFrozen"
        ]
    );

    let task = core.log.with_state(|s| s.find_task(&task_id).cloned()).unwrap();
    assert_eq!(task.status, TaskStatus::ReadyToHandoff);

    // Both handoff files exist on disk, under the topic directory.
    let md = task.handoff_prompt_path.unwrap();
    let json = task.handoff_spec_path.unwrap();
    assert!(md.exists(), "missing {}", md.display());
    assert!(json.exists(), "missing {}", json.display());
    assert!(md.parent().unwrap().ends_with("jwt-refresh-fix"));

    // The frozen contract parses and carries the current version.
    let spec: cvr_core::HandoffSpec =
        serde_json::from_slice(&std::fs::read(&json).unwrap()).unwrap();
    assert_eq!(spec.version, cvr_core::HANDOFF_VERSION);
    assert_eq!(spec.goal, "JWT refresh fix");
}

#[tokio::test]
async fn freeze_is_idempotent_across_the_full_stack() {
    let dir = tempdir().unwrap();
    let core = Core::open(dir.path());
    let task_id = core.refined_task().await;

    let seq_before = core.log.last_seq();
    let again = core
        .orchestrator
        .freeze_prompt(&task_id, None, None)
        .await
        .unwrap();

    assert!(again.already_frozen);
    assert_eq!(core.log.last_seq(), seq_before, "no new events on re-freeze");

    // The working prompt is immutable once frozen.
    let err = core
        .orchestrator
        .update_working_prompt(&task_id, "late edit", "sneaky change", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid state") || err.to_string().contains("frozen"));
}
