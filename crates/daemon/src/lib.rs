// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cvr-daemon: The Conversator control-plane daemon (`cvrd`).
//!
//! Wires the event log, prompt workspace, builder adapters, orchestrator,
//! inbox notifier, and the two external surfaces: a Unix-socket tool
//! surface for the voice layer and an HTTP fan-out (REST + WebSocket) for
//! the dashboard.

pub mod config;
pub mod conversation;
pub mod env;
pub mod fanout;
pub mod lifecycle;
pub mod listener;
pub mod notifier;
pub mod orchestrator;

pub use config::DaemonConfig;
pub use conversation::ConversationFeed;
pub use lifecycle::{startup, Config, DaemonState, LifecycleError};
pub use notifier::Notifier;
pub use orchestrator::{Orchestrator, QuickDispatchResult, RuntimeError};

/// The session pool with the daemon's concrete clock.
pub type DaemonPool = cvr_adapters::SessionPool<cvr_core::SystemClock>;
