// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/ws/events`: incremental broadcast with cursor resume.
//!
//! Each subscriber owns a bounded outbound queue. A subscriber whose queue
//! fills is disconnected rather than allowed to block fan-out; it
//! reconnects with its last-seen cursor and missed domain events are
//! re-sent in order. Domain events are never dropped.

use super::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use cvr_core::event::{Event, EventBody};
use cvr_storage::EventLog;
use cvr_wire::{BuilderStatusUpdate, InboxEntry, TaskSummary, TaskUpdate, WsMessage};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

/// Per-subscriber outbound queue depth; filling it means the client is too
/// slow and gets disconnected.
const SUBSCRIBER_QUEUE: usize = 256;

#[derive(Deserialize)]
pub(super) struct WsParams {
    /// Last-seen domain event seq; missed events are replayed after it.
    #[serde(default)]
    cursor: u64,
    /// Last-seen conversation feed cursor.
    #[serde(default)]
    conversation_cursor: u64,
}

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: AppState, params: WsParams) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(SUBSCRIBER_QUEUE);

    // Forwarder: domain subscription + conversation tail → bounded queue.
    // try_send keeps the broadcast producer from ever blocking on this
    // subscriber; a full queue tears the connection down.
    let forwarder = {
        let state = state.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut subscription = state.log.subscribe(params.cursor);
            let mut conversation = state.conversation.subscribe();

            for entry in state.conversation.entries_after(params.conversation_cursor) {
                if tx.try_send(WsMessage::ConversationEntry(entry)).is_err() {
                    return;
                }
            }

            loop {
                tokio::select! {
                    event = subscription.recv() => {
                        for message in translate(&state.log, &event) {
                            if tx.try_send(message).is_err() {
                                tracing::debug!("slow ws subscriber, disconnecting");
                                return;
                            }
                        }
                    }
                    entry = conversation.recv() => {
                        match entry {
                            Ok(entry) => {
                                if tx.try_send(WsMessage::ConversationEntry(entry)).is_err() {
                                    return;
                                }
                            }
                            // A lagged transcript tail just skips ahead.
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            }
        })
    };

    // Writer: queue → socket.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader: only watches for close.
    while let Some(Ok(message)) = stream.next().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }

    forwarder.abort();
    writer.abort();
}

/// Translate one domain event into broadcast messages.
///
/// Every task-scoped event yields a `task_update`; session observations
/// add a `builder_status`; notifying events add their `inbox_item`.
pub(crate) fn translate(log: &EventLog, event: &Event) -> Vec<WsMessage> {
    let mut out = Vec::new();

    if let Some(task_id) = event.task_id {
        if let Some(task) = log.with_state(|s| s.tasks.get(&task_id).map(TaskSummary::from)) {
            out.push(WsMessage::TaskUpdate(TaskUpdate { seq: event.seq, task }));
        }

        match &event.body {
            EventBody::BuilderDispatched { session_id, .. } => {
                out.push(WsMessage::BuilderStatus(BuilderStatusUpdate {
                    seq: event.seq,
                    task_id: task_id.as_str().to_string(),
                    session_id: Some(session_id.to_string()),
                    status: cvr_core::session::SessionStatus::Created,
                    reason: None,
                }));
            }
            EventBody::BuilderStatusChanged { status, reason } => {
                out.push(WsMessage::BuilderStatus(BuilderStatusUpdate {
                    seq: event.seq,
                    task_id: task_id.as_str().to_string(),
                    session_id: event
                        .refs
                        .as_ref()
                        .and_then(|r| r.session_id.as_ref())
                        .map(|s| s.to_string()),
                    status: *status,
                    reason: reason.clone(),
                }));
            }
            _ => {}
        }
    }

    if let Some(item) =
        log.with_state(|s| s.inbox.iter().find(|i| i.event_seq == event.seq).map(InboxEntry::from))
    {
        out.push(WsMessage::InboxItem(item));
    }

    out
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
