// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cvr-adapters: Uniform interface over remote builder servers.
//!
//! A builder is an opaque HTTP server with an SSE event stream per session.
//! [`BuilderAdapter`] is the capability set the core depends on; the
//! [`SessionPool`] owns live sessions, enforces one per task, and converts
//! remote events into proposed domain events published through the event
//! log (never mutating derived state directly).

pub mod builder;
pub mod context;
mod http;
mod pool;
mod remote;
mod sse;

pub mod notify;

pub use builder::{
    BuilderAdapter, BuilderConfig, BuilderError, BuilderLimits, BuilderRegistry, BuilderTimeouts,
    CreateSessionRequest, RemoteArtifact, RemoteEvent, SessionHealth, StreamFrame,
};
pub use context::{ContextHit, ContextLookup, NoopContextLookup};
pub use notify::{DesktopNotifyAdapter, NotifyAdapter, NotifyError};
pub use pool::{
    dispatch_token, load_cursor, AbortOutcome, DispatchOutcome, DispatchRequest, PoolError,
    SessionPool,
};
pub use remote::HttpBuilderAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BuilderCall, FakeBuilderAdapter};
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
