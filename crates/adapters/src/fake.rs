// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake builder for tests.
//!
//! Records every call and lets tests drive the remote side: push stream
//! events, set health answers, and choose abort behavior.

use crate::builder::{
    BuilderAdapter, BuilderError, CreateSessionRequest, RemoteEvent, SessionHealth, StreamFrame,
};
use async_trait::async_trait;
use cvr_core::session::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Recorded adapter call
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderCall {
    CreateSession { task_id: String },
    SendMessage { session_id: String, content: String },
    StreamEvents { session_id: String, cursor: u64 },
    Abort { session_id: String },
    Health { session_id: String },
}

struct FakeState {
    calls: Vec<BuilderCall>,
    next_session: u32,
    cursors: HashMap<String, u64>,
    streams: HashMap<String, mpsc::Sender<StreamFrame>>,
    pending: HashMap<String, Vec<StreamFrame>>,
    health: HashMap<String, SessionHealth>,
    /// Reply to `abort` by emitting an aborted status frame (the behavior
    /// of a cooperative remote). Disable to test unconfirmed aborts.
    auto_confirm_abort: bool,
    fail_create: Option<String>,
}

/// Fake builder adapter for testing
#[derive(Clone)]
pub struct FakeBuilderAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeBuilderAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                next_session: 0,
                cursors: HashMap::new(),
                streams: HashMap::new(),
                pending: HashMap::new(),
                health: HashMap::new(),
                auto_confirm_abort: true,
                fail_create: None,
            })),
        }
    }
}

impl FakeBuilderAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<BuilderCall> {
        self.inner.lock().calls.clone()
    }

    /// Script the next `create_session` to fail with a rejection.
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        self.inner.lock().fail_create = Some(reason.into());
    }

    /// Choose whether `abort` emits a confirming aborted frame.
    pub fn set_auto_confirm_abort(&self, confirm: bool) {
        self.inner.lock().auto_confirm_abort = confirm;
    }

    /// Script a health answer for a session.
    pub fn set_health(&self, session_id: &str, health: SessionHealth) {
        self.inner.lock().health.insert(session_id.to_string(), health);
    }

    /// Push a remote event into a session's stream (buffered until the
    /// stream is opened).
    pub fn push_event(&self, session_id: &str, event: RemoteEvent) {
        let mut inner = self.inner.lock();
        let cursor = {
            let c = inner.cursors.entry(session_id.to_string()).or_insert(0);
            *c += 1;
            *c
        };
        let frame = StreamFrame { cursor, event };
        if let Some(tx) = inner.streams.get(session_id) {
            if tx.try_send(frame.clone()).is_ok() {
                return;
            }
        }
        inner.pending.entry(session_id.to_string()).or_default().push(frame);
    }

    /// Drop a session's stream, simulating the remote closing it.
    pub fn close_stream(&self, session_id: &str) {
        self.inner.lock().streams.remove(session_id);
    }
}

#[async_trait]
impl BuilderAdapter for FakeBuilderAdapter {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionId, BuilderError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(BuilderCall::CreateSession { task_id: request.task_id.as_str().to_string() });
        if let Some(reason) = inner.fail_create.take() {
            return Err(BuilderError::Rejected(reason));
        }
        inner.next_session += 1;
        Ok(SessionId::new(format!("bs-{}", inner.next_session)))
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        content: &str,
    ) -> Result<(), BuilderError> {
        self.inner.lock().calls.push(BuilderCall::SendMessage {
            session_id: session_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn stream_events(
        &self,
        session_id: &SessionId,
        cursor: u64,
        _cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamFrame>, BuilderError> {
        let (tx, rx) = mpsc::channel(64);
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(BuilderCall::StreamEvents { session_id: session_id.to_string(), cursor });
        if let Some(frames) = inner.pending.remove(session_id.as_str()) {
            for frame in frames {
                if frame.cursor > cursor {
                    let _ = tx.try_send(frame);
                }
            }
        }
        inner.streams.insert(session_id.to_string(), tx);
        Ok(rx)
    }

    async fn abort(&self, session_id: &SessionId) -> Result<(), BuilderError> {
        let confirm = {
            let mut inner = self.inner.lock();
            inner.calls.push(BuilderCall::Abort { session_id: session_id.to_string() });
            inner.auto_confirm_abort
        };
        if confirm {
            self.push_event(
                session_id.as_str(),
                RemoteEvent::Status { status: "aborted".into(), reason: None },
            );
        }
        Ok(())
    }

    async fn health(&self, session_id: &SessionId) -> Result<SessionHealth, BuilderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BuilderCall::Health { session_id: session_id.to_string() });
        Ok(inner
            .health
            .get(session_id.as_str())
            .cloned()
            .unwrap_or(SessionHealth::Gone))
    }
}
