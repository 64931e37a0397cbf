// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP builder adapter.
//!
//! Speaks the builder session API: JSON request/response endpoints plus an
//! SSE event stream per session. One instance serves one configured
//! endpoint.

use crate::builder::{
    BuilderAdapter, BuilderConfig, BuilderError, CreateSessionRequest, SessionHealth, StreamFrame,
};
use crate::http;
use crate::sse::SseParser;
use async_trait::async_trait;
use cvr_core::session::SessionId;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Adapter for a remote builder exposing the HTTP session API.
#[derive(Clone)]
pub struct HttpBuilderAdapter {
    endpoint: String,
    auth_token: Option<String>,
    timeouts: crate::builder::BuilderTimeouts,
}

impl HttpBuilderAdapter {
    pub fn new(config: &BuilderConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    fn token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}

#[async_trait]
impl BuilderAdapter for HttpBuilderAdapter {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionId, BuilderError> {
        let body = serde_json::json!({
            "task_id": request.task_id.as_str(),
            "topic": request.topic.as_str(),
            "handoff_md": request.handoff_md_path,
            "handoff_json": request.handoff_json_path,
            "handoff_digest": request.handoff_digest,
            "model": request.default_model,
        });
        let response = http::post(
            &self.endpoint,
            "/api/v1/sessions",
            &body.to_string(),
            self.token(),
            self.timeouts.create(),
        )
        .await?;

        let json: serde_json::Value = serde_json::from_str(&response)
            .map_err(|e| BuilderError::Protocol(format!("create response: {}", e)))?;
        let session_id = json
            .get("session_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BuilderError::Protocol("create response missing session_id".into()))?;
        Ok(SessionId::new(session_id))
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        content: &str,
    ) -> Result<(), BuilderError> {
        let body = serde_json::json!({ "content": content });
        http::post(
            &self.endpoint,
            &format!("/api/v1/sessions/{}/messages", session_id),
            &body.to_string(),
            self.token(),
            self.timeouts.send(),
        )
        .await?;
        Ok(())
    }

    async fn stream_events(
        &self,
        session_id: &SessionId,
        cursor: u64,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamFrame>, BuilderError> {
        let path = format!("/api/v1/sessions/{}/events?cursor={}", session_id, cursor);
        let mut reader =
            http::open_stream(&self.endpoint, &path, self.token(), self.timeouts.create())
                .await?;

        let (tx, rx) = mpsc::channel(64);
        let session = session_id.clone();
        tokio::spawn(async move {
            let mut parser = SseParser::new(cursor);
            let mut line = String::new();
            loop {
                line.clear();
                let read = tokio::select! {
                    r = reader.read_line(&mut line) => r,
                    _ = cancel.cancelled() => break,
                };
                match read {
                    Ok(0) => break,
                    Ok(_) => {
                        if let Some(frame) = parser.feed_line(line.trim_end_matches(['\r', '\n']))
                        {
                            if tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(session = %session, error = %e, "builder stream read error");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn abort(&self, session_id: &SessionId) -> Result<(), BuilderError> {
        http::post(
            &self.endpoint,
            &format!("/api/v1/sessions/{}/abort", session_id),
            "{}",
            self.token(),
            self.timeouts.send(),
        )
        .await?;
        Ok(())
    }

    async fn health(&self, session_id: &SessionId) -> Result<SessionHealth, BuilderError> {
        let response = match http::get(
            &self.endpoint,
            &format!("/api/v1/sessions/{}", session_id),
            self.token(),
            self.timeouts.send(),
        )
        .await
        {
            Ok(r) => r,
            Err(BuilderError::Gone) => return Ok(SessionHealth::Gone),
            Err(e) => return Err(e),
        };

        let json: serde_json::Value = serde_json::from_str(&response)
            .map_err(|e| BuilderError::Protocol(format!("health response: {}", e)))?;
        let status = json.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
        let reason = json.get("reason").and_then(|v| v.as_str()).map(String::from);
        match status {
            "created" | "running" | "paused" | "waiting_permission" => Ok(SessionHealth::Running),
            "completed" | "failed" | "aborted" => {
                Ok(SessionHealth::Terminal { status: status.to_string(), reason })
            }
            _ => Ok(SessionHealth::Gone),
        }
    }
}
