// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cvr_core::handoff::{GateFlags, HandoffSpec};
use tempfile::tempdir;

fn topic() -> TopicSlug {
    TopicSlug::new("jwt-refresh-fix")
}

fn spec() -> HandoffSpec {
    HandoffSpec::new("fix JWT refresh")
        .gates(GateFlags { write: true, run: false, destructive: false })
}

#[tokio::test]
async fn update_working_creates_topic_dir() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());

    let path = ws.update_working(&topic(), "# JWT refresh fix\n").await.unwrap();
    assert!(path.ends_with("jwt-refresh-fix/working.md"));
    assert_eq!(ws.read_working(&topic()).await.unwrap(), "# JWT refresh fix\n");
}

#[tokio::test]
async fn update_overwrites_atomically() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());

    ws.update_working(&topic(), "v1").await.unwrap();
    ws.update_working(&topic(), "v2").await.unwrap();
    assert_eq!(ws.read_working(&topic()).await.unwrap(), "v2");
    // No temp litter left behind.
    assert!(!ws.working_path(&topic()).with_extension("tmp").exists());
}

#[tokio::test]
async fn freeze_requires_working_prompt() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());

    let err = ws.freeze(&topic(), "handoff", &spec()).await.unwrap_err();
    assert!(matches!(err, PromptError::WorkingMissing(_)));
}

#[tokio::test]
async fn freeze_produces_both_files() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());
    ws.update_working(&topic(), "working").await.unwrap();

    let frozen = ws.freeze(&topic(), "# Handoff\n", &spec()).await.unwrap();
    assert!(!frozen.already_frozen);
    assert!(frozen.handoff_md_path.exists());
    assert!(frozen.handoff_json_path.exists());
    assert_eq!(frozen.digest.len(), 64);

    let read = ws.read_handoff(&topic()).await.unwrap();
    assert_eq!(read, spec());
}

#[tokio::test]
async fn freeze_is_idempotent() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());
    ws.update_working(&topic(), "working").await.unwrap();

    let first = ws.freeze(&topic(), "# Handoff\n", &spec()).await.unwrap();
    let second = ws.freeze(&topic(), "# Different\n", &spec()).await.unwrap();

    assert!(second.already_frozen);
    assert_eq!(second.handoff_md_path, first.handoff_md_path);
    assert_eq!(second.handoff_json_path, first.handoff_json_path);
    assert_eq!(second.digest, first.digest);
    // Content unchanged by the second call.
    let md = tokio::fs::read_to_string(&first.handoff_md_path).await.unwrap();
    assert_eq!(md, "# Handoff\n");
}

#[tokio::test]
async fn frozen_topic_rejects_working_updates() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());
    ws.update_working(&topic(), "working").await.unwrap();
    ws.freeze(&topic(), "handoff", &spec()).await.unwrap();

    let err = ws.update_working(&topic(), "more").await.unwrap_err();
    assert!(matches!(err, PromptError::Frozen(_)));
}

#[tokio::test]
async fn future_handoff_version_rejected_on_read() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());
    ws.update_working(&topic(), "working").await.unwrap();

    let mut future = spec();
    future.version = cvr_core::handoff::HANDOFF_VERSION + 1;
    ws.freeze(&topic(), "handoff", &future).await.unwrap();

    let err = ws.read_handoff(&topic()).await.unwrap_err();
    assert!(matches!(err, PromptError::Version(_)));
}

#[tokio::test]
async fn cross_topic_writes_are_independent() {
    let dir = tempdir().unwrap();
    let ws = std::sync::Arc::new(PromptWorkspace::new(dir.path()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let ws = std::sync::Arc::clone(&ws);
        handles.push(tokio::spawn(async move {
            let t = TopicSlug::new(format!("topic-{}", i));
            ws.update_working(&t, &format!("content {}", i)).await.unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    for i in 0..8 {
        let t = TopicSlug::new(format!("topic-{}", i));
        assert_eq!(ws.read_working(&t).await.unwrap(), format!("content {}", i));
    }
}

#[test]
fn artifact_paths_are_deterministic() {
    let dir = tempdir().unwrap();
    let ws = PromptWorkspace::new(dir.path());

    let p = ws.artifact_path(&topic(), "diff", "auth-fix", 1_700_000_000_000);
    let name = p.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("-auth-fix.md"), "{}", name);
    assert!(p.parent().unwrap().ends_with("jwt-refresh-fix/artifacts"));

    let log = ws.artifact_path(&topic(), "log", "run", 1_700_000_000_000);
    assert!(log.to_string_lossy().ends_with("-run.log"));
}
