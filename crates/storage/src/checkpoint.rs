// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint writer for derived-state snapshots.

use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::CoreState;
use std::path::{Path, PathBuf};

/// Result of a successful checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointResult {
    pub seq: u64,
    pub size_bytes: u64,
}

/// Writes snapshots atomically (temp + rename).
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Write a snapshot of `state` current through `seq`.
    pub fn checkpoint_sync(
        &self,
        seq: u64,
        state: &CoreState,
    ) -> Result<CheckpointResult, SnapshotError> {
        let snapshot = Snapshot::new(seq, state.clone());
        let bytes = snapshot.to_bytes()?;
        let size_bytes = bytes.len() as u64;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;

        Ok(CheckpointResult { seq, size_bytes })
    }
}

/// Load a snapshot if one exists and is readable.
///
/// Unreadable or version-incompatible snapshots are ignored (boot replays
/// the WAL from the start), not fatal.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match Snapshot::from_bytes(&bytes) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable snapshot");
            Ok(None)
        }
    }
}
