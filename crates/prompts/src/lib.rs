// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cvr-prompts: Filesystem-backed prompt workspace.
//!
//! One directory per topic holding a mutable `working.md` and, once frozen,
//! the immutable `handoff.md` + `handoff.json` pair. Freezing is atomic
//! (both files or neither) and idempotent.

mod workspace;

pub use workspace::{FrozenHandoff, PromptError, PromptWorkspace};
