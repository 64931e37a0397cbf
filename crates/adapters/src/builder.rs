// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The builder capability set and the registry of configured builders.
//!
//! Each concrete adapter speaks one remote builder's session API. The
//! capability set is deliberately narrow: create a session, send a message,
//! stream its events, abort it, check its health. Gate resolutions travel
//! through `send_message` as a structured payload so the set stays closed.

use async_trait::async_trait;
use cvr_core::id::{TaskId, TopicSlug};
use cvr_core::session::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Errors from builder adapter operations
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The remote rejected the session or returned a terminal error.
    #[error("remote rejected: {0}")]
    Rejected(String),
    /// Malformed remote payload.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The session no longer exists on the remote.
    #[error("session gone")]
    Gone,
}

impl BuilderError {
    /// Transient errors are retried with backoff inside the adapter;
    /// everything else escalates to a domain event.
    pub fn is_transient(&self) -> bool {
        matches!(self, BuilderError::Connect(_) | BuilderError::Timeout)
    }
}

/// Artifact pointer as reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtifact {
    #[serde(default)]
    pub kind: String,
    pub path: PathBuf,
}

/// A recognized remote event, translated from one SSE frame.
///
/// Translation is total over this set; frames that parse to none of these
/// are logged with their raw payload and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Status { status: String, reason: Option<String> },
    Gate { kind: String, detail: serde_json::Value },
    Completed { artifacts: Vec<RemoteArtifact> },
    Failed { reason: String },
}

/// One frame from a session's event stream, with its resume cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    /// Remote cursor; resuming a stream from it replays nothing.
    pub cursor: u64,
    pub event: RemoteEvent,
}

/// Remote session health as seen by `health`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionHealth {
    Running,
    /// Terminal on the remote; carries the terminal status string.
    Terminal { status: String, reason: Option<String> },
    /// The remote no longer knows the session.
    Gone,
}

/// Inputs for creating a remote session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub task_id: TaskId,
    pub topic: TopicSlug,
    /// Pointer-first handoff references; contents are not inlined.
    pub handoff_md_path: PathBuf,
    pub handoff_json_path: PathBuf,
    pub handoff_digest: String,
    pub default_model: Option<String>,
}

/// Adapter for one remote builder's session protocol.
#[async_trait]
pub trait BuilderAdapter: Send + Sync + 'static {
    /// Create a remote session for a task. Returns the remote-assigned id.
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionId, BuilderError>;

    /// Send a message into the session. Gate resolutions are sent as a
    /// structured JSON payload (`{"type":"gate_resolution",...}`).
    async fn send_message(
        &self,
        session_id: &SessionId,
        content: &str,
    ) -> Result<(), BuilderError>;

    /// Open the session's event stream from `cursor`.
    ///
    /// The returned channel yields frames until the stream closes or the
    /// cancellation token fires. Reconnect policy lives in the caller.
    async fn stream_events(
        &self,
        session_id: &SessionId,
        cursor: u64,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamFrame>, BuilderError>;

    /// Ask the remote to abort the session.
    async fn abort(&self, session_id: &SessionId) -> Result<(), BuilderError>;

    /// Point-in-time session health (used at reconciliation).
    async fn health(&self, session_id: &SessionId) -> Result<SessionHealth, BuilderError>;
}

/// Timeout policy for one builder. Values are configurable per builder
/// declaration; defaults match the config document's documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderTimeouts {
    /// Remote session create.
    pub create_s: u64,
    /// Per-message send.
    pub send_s: u64,
    /// Stream considered idle after this long without a frame.
    pub stream_idle_s: u64,
    /// Bounded wait for the stream to confirm an abort.
    pub abort_confirm_s: u64,
}

impl Default for BuilderTimeouts {
    fn default() -> Self {
        Self { create_s: 30, send_s: 15, stream_idle_s: 120, abort_confirm_s: 10 }
    }
}

impl BuilderTimeouts {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_s)
    }
    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send_s)
    }
    pub fn stream_idle(&self) -> Duration {
        Duration::from_secs(self.stream_idle_s)
    }
    pub fn abort_confirm(&self) -> Duration {
        Duration::from_secs(self.abort_confirm_s)
    }
}

/// Resource limits for one builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderLimits {
    /// Maximum concurrent live sessions against this builder.
    pub max_sessions: usize,
    /// Stream reconnect attempts within the window before escalating.
    pub max_reconnects: u32,
    /// Window for counting reconnects, seconds.
    pub reconnect_window_s: u64,
}

impl Default for BuilderLimits {
    fn default() -> Self {
        Self { max_sessions: 4, max_reconnects: 5, reconnect_window_s: 300 }
    }
}

/// One builder declaration from the startup configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub name: String,
    /// Kind string tasks select builders by.
    pub kind: String,
    /// `host:port` of the remote session API.
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub timeouts: BuilderTimeouts,
    #[serde(default)]
    pub limits: BuilderLimits,
}

/// A configured builder with its adapter instance.
#[derive(Clone)]
pub struct RegisteredBuilder {
    pub config: BuilderConfig,
    pub adapter: Arc<dyn BuilderAdapter>,
}

/// Maps `builder_kind` to its adapter and configuration. Loaded once at
/// startup; multiple kinds may coexist and selection is per-task.
#[derive(Clone, Default)]
pub struct BuilderRegistry {
    builders: HashMap<String, RegisteredBuilder>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, config: BuilderConfig, adapter: Arc<dyn BuilderAdapter>) {
        self.builders
            .insert(config.kind.clone(), RegisteredBuilder { config, adapter });
    }

    pub fn get(&self, kind: &str) -> Option<&RegisteredBuilder> {
        self.builders.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    pub fn configs(&self) -> impl Iterator<Item = &BuilderConfig> {
        self.builders.values().map(|b| &b.config)
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
