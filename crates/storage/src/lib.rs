// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cvr-storage: Durable event log and derived state.
//!
//! The WAL is the source of truth: an append-only JSONL file of domain
//! events, totally ordered by `seq`. [`CoreState`] is materialized by
//! replaying it; snapshots are advisory accelerators only. [`EventLog`]
//! enforces the single-writer discipline — validate, assign seq, persist,
//! apply, publish — and hands out gap-free, duplicate-free subscriptions.

mod checkpoint;
mod log;
mod snapshot;
mod state;
mod wal;

pub use checkpoint::{load_snapshot, CheckpointResult, Checkpointer};
pub use log::{AppendError, EventLog, StateView, Subscription};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::{CommandRecord, CoreState, FrozenInfo, TopicRecord};
pub use wal::{Wal, WalError};
