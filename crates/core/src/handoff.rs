// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The handoff execution contract.
//!
//! Freezing a working prompt produces an immutable pair: `handoff.md`
//! (prose) and `handoff.json` (this structure). The JSON carries an
//! embedded version; readers must reject unknown major versions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Current handoff schema version.
pub const HANDOFF_VERSION: u32 = 1;

/// Authorization checkpoint kinds a builder may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Write,
    Run,
    Destructive,
}

crate::simple_display! {
    GateKind {
        Write => "write",
        Run => "run",
        Destructive => "destructive",
    }
}

impl GateKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "write" => Some(GateKind::Write),
            "run" => Some(GateKind::Run),
            "destructive" => Some(GateKind::Destructive),
            _ => None,
        }
    }
}

/// Gate flags embedded in the contract. Authoritative: the adapter and the
/// upstream builder honor them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateFlags {
    pub write: bool,
    pub run: bool,
    pub destructive: bool,
}

impl GateFlags {
    pub fn allows(&self, kind: GateKind) -> bool {
        match kind {
            GateKind::Write => self.write,
            GateKind::Run => self.run,
            GateKind::Destructive => self.destructive,
        }
    }
}

/// A repository the builder is expected to touch, with intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub path: PathBuf,
    pub intent: String,
}

/// Pointer-first context: the contract references artifacts by path and the
/// external task graph by opaque id, never inlining content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPointers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_paths: Vec<PathBuf>,
}

/// Optional execution budgets forwarded to the builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budgets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<u32>,
}

/// The frozen execution contract (`handoff.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSpec {
    pub version: u32,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definition_of_done: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repo_targets: Vec<RepoTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_artifacts: Vec<String>,
    #[serde(default)]
    pub gates: GateFlags,
    #[serde(default)]
    pub context_pointers: ContextPointers,
    #[serde(default)]
    pub budgets: Budgets,
}

impl HandoffSpec {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            version: HANDOFF_VERSION,
            goal: goal.into(),
            definition_of_done: Vec::new(),
            constraints: Vec::new(),
            repo_targets: Vec::new(),
            expected_artifacts: Vec::new(),
            gates: GateFlags::default(),
            context_pointers: ContextPointers::default(),
            budgets: Budgets::default(),
        }
    }

    crate::setters! {
        set {
            definition_of_done: Vec<String>,
            constraints: Vec<String>,
            repo_targets: Vec<RepoTarget>,
            expected_artifacts: Vec<String>,
            gates: GateFlags,
            context_pointers: ContextPointers,
            budgets: Budgets,
        }
    }

    /// Reject contracts written by an incompatible (newer) major version.
    pub fn check_version(&self) -> Result<(), HandoffVersionError> {
        if self.version > HANDOFF_VERSION {
            return Err(HandoffVersionError {
                found: self.version,
                supported: HANDOFF_VERSION,
            });
        }
        Ok(())
    }
}

/// Unknown handoff schema version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handoff version {found} not supported (max {supported})")]
pub struct HandoffVersionError {
    pub found: u32,
    pub supported: u32,
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
