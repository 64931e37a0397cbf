// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot format for derived state.
//!
//! Snapshots are advisory: they only exist so boot can skip replaying the
//! whole WAL. Deleting one is always safe.

use crate::state::CoreState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current snapshot format version. Bumps invalidate older snapshots
/// (boot falls back to a full WAL replay).
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// Errors from snapshot reading and writing
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// A point-in-time capture of derived state at a WAL seq.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Seq the state is current through.
    pub seq: u64,
    pub state: CoreState,
}

impl Snapshot {
    pub fn new(seq: u64, state: CoreState) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, seq, state }
    }

    /// Serialize and zstd-compress.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let json = serde_json::to_vec(self)?;
        let compressed = zstd::encode_all(json.as_slice(), 3)?;
        Ok(compressed)
    }

    /// Decompress and deserialize, rejecting unknown versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let json = zstd::decode_all(bytes)?;
        let snapshot: Snapshot = serde_json::from_slice(&json)?;
        if snapshot.version > CURRENT_SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
