// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::checkpoint::{load_snapshot, Checkpointer};
use tempfile::tempdir;

#[test]
fn snapshot_roundtrips_compressed() {
    let snapshot = Snapshot::new(42, CoreState::default());
    let bytes = snapshot.to_bytes().unwrap();
    let back = Snapshot::from_bytes(&bytes).unwrap();
    assert_eq!(back.seq, 42);
    assert_eq!(back.version, CURRENT_SNAPSHOT_VERSION);
    assert_eq!(back.state, CoreState::default());
}

#[test]
fn future_version_rejected() {
    let mut snapshot = Snapshot::new(1, CoreState::default());
    snapshot.version = CURRENT_SNAPSHOT_VERSION + 1;
    let bytes = snapshot.to_bytes().unwrap();
    assert!(matches!(
        Snapshot::from_bytes(&bytes),
        Err(SnapshotError::UnsupportedVersion(_))
    ));
}

#[test]
fn checkpoint_write_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.zst");

    let checkpointer = Checkpointer::new(path.clone());
    let result = checkpointer.checkpoint_sync(7, &CoreState::default()).unwrap();
    assert_eq!(result.seq, 7);
    assert!(result.size_bytes > 0);

    let loaded = load_snapshot(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 7);
}

#[test]
fn missing_snapshot_is_none() {
    let dir = tempdir().unwrap();
    assert!(load_snapshot(&dir.path().join("absent.zst")).unwrap().is_none());
}

#[test]
fn unreadable_snapshot_is_ignored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.zst");
    std::fs::write(&path, b"garbage").unwrap();
    assert!(load_snapshot(&path).unwrap().is_none());
}
