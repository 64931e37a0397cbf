// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent-events frame parsing for builder streams.
//!
//! Frames arrive as `event:`/`data:`/`id:` line groups terminated by a
//! blank line. `id:` carries the resume cursor. Recognized event names map
//! to [`RemoteEvent`]s; anything else is logged with its raw payload and
//! dropped (translation stays total over the recognized set).

use crate::builder::{RemoteArtifact, RemoteEvent, StreamFrame};

/// Incremental SSE parser. Feed lines, collect frames.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    event: Option<String>,
    data: Vec<String>,
    id: Option<u64>,
    last_cursor: u64,
}

impl SseParser {
    pub(crate) fn new(cursor: u64) -> Self {
        Self { last_cursor: cursor, ..Self::default() }
    }

    /// Feed one line (without trailing newline). Returns a frame when the
    /// blank-line terminator completes one.
    pub(crate) fn feed_line(&mut self, line: &str) -> Option<StreamFrame> {
        if line.is_empty() {
            return self.flush();
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("id:") {
            self.id = rest.trim().parse().ok();
        } else if line.starts_with(':') {
            // Comment / keepalive.
        } else {
            tracing::debug!(line, "ignoring unrecognized SSE line");
        }
        None
    }

    fn flush(&mut self) -> Option<StreamFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        let cursor = self.id.take().unwrap_or(self.last_cursor);

        let name = event?;
        if data.is_empty() && name != "aborted" {
            return None;
        }

        let remote = translate(&name, &data)?;
        self.last_cursor = cursor;
        Some(StreamFrame { cursor, event: remote })
    }
}

/// Map one named SSE event to a [`RemoteEvent`].
fn translate(name: &str, data: &str) -> Option<RemoteEvent> {
    let json: serde_json::Value = if data.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(name, data, error = %e, "malformed builder stream payload");
                return None;
            }
        }
    };

    match name {
        "status" => {
            let status = json.get("status").and_then(|v| v.as_str())?.to_string();
            let reason = json.get("reason").and_then(|v| v.as_str()).map(String::from);
            Some(RemoteEvent::Status { status, reason })
        }
        "gate" | "gate_requested" => {
            let kind = json.get("kind").and_then(|v| v.as_str())?.to_string();
            let detail = json.get("detail").cloned().unwrap_or(serde_json::Value::Null);
            Some(RemoteEvent::Gate { kind, detail })
        }
        "completed" => {
            let artifacts = json
                .get("artifacts")
                .and_then(|v| serde_json::from_value::<Vec<RemoteArtifact>>(v.clone()).ok())
                .unwrap_or_default();
            Some(RemoteEvent::Completed { artifacts })
        }
        "failed" => {
            let reason = json
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("builder reported failure")
                .to_string();
            Some(RemoteEvent::Failed { reason })
        }
        "aborted" => Some(RemoteEvent::Status { status: "aborted".into(), reason: None }),
        other => {
            tracing::warn!(event = other, data, "dropping unrecognized builder event");
            None
        }
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
