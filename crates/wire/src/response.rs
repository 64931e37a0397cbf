// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::types::{
    BuilderSummary, ContextHitEntry, DeliveryHint, InboxEntry, SystemHealthSummary,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Response from daemon to the voice layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello { version: String },

    /// Daemon is shutting down
    ShuttingDown,

    /// Task created
    TaskCreated { task_id: String, topic: String },

    /// Freeze outcome (idempotent: `already_frozen` marks a repeat)
    Frozen {
        task_id: String,
        handoff_md_path: PathBuf,
        handoff_json_path: PathBuf,
        digest: String,
        already_frozen: bool,
    },

    /// Dispatch outcome (`reused` marks an idempotent repeat)
    Dispatched { task_id: String, session_id: String, reused: bool },

    /// Command accepted; completion arrives via the event stream
    Pending { task_id: String, last_seq: u64 },

    /// Daemon status
    Status {
        health: SystemHealthSummary,
        builders: Vec<BuilderSummary>,
        inbox_unread: Vec<InboxEntry>,
    },

    /// Context lookup hits (pointer-first)
    ContextHits { hits: Vec<ContextHitEntry> },

    /// Pending delivery hints
    Delivery { hints: Vec<DeliveryHint> },

    /// Inbox items acknowledged
    Acknowledged { ids: Vec<String> },

    /// Error response
    Error { message: String },
}
