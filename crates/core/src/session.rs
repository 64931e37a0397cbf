// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder session records.
//!
//! A session is one in-flight interaction with a remote builder for one
//! task. The id is assigned by the remote on session creation and recorded
//! locally; each task owns at most one live session at a time.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Identifier assigned by a remote builder for one of its sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for SessionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SessionId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Status reported for a builder session.
///
/// `Lost` is an observation (stream gone, health check failed) and is never
/// stored on a session record; applying it records the session as `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Paused,
    WaitingPermission,
    Completed,
    Failed,
    Aborted,
    Lost,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Failed
                | SessionStatus::Aborted
                | SessionStatus::Lost
        )
    }
}

crate::simple_display! {
    SessionStatus {
        Created => "created",
        Running => "running",
        Paused => "paused",
        WaitingPermission => "waiting_permission",
        Completed => "completed",
        Failed => "failed",
        Aborted => "aborted",
        Lost => "lost",
    }
}

/// Pointer to an artifact produced by a builder session.
///
/// The control plane never stores artifact contents, only paths into the
/// prompt workspace (or remote-reported locations).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPointer {
    /// Artifact kind (e.g. "diff", "log", "report").
    pub kind: String,
    pub path: PathBuf,
    pub created_at_ms: u64,
}

/// Locally recorded state of one remote builder session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderSession {
    pub id: SessionId,
    pub task_id: TaskId,
    pub builder_kind: String,
    pub status: SessionStatus,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    /// Pointer records for artifacts the session reported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactPointer>,
    /// Idempotency token carried by the dispatch that created this session.
    pub dispatch_token: String,
    /// Gate awaiting user resolution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_gate: Option<crate::handoff::GateKind>,
}

impl BuilderSession {
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
