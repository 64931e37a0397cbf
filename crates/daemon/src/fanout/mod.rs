// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out service: REST snapshots plus the `/ws/events` broadcast.
//!
//! Read-only consumers (the dashboard) get current-state snapshots and an
//! incremental event stream with cursor resume. The write endpoints are
//! the sole external write entrypoints and forward to the orchestrator.

mod rest;
mod ws;

use crate::conversation::ConversationFeed;
use crate::notifier::Notifier;
use crate::orchestrator::Orchestrator;
use cvr_adapters::DesktopNotifyAdapter;
use cvr_storage::EventLog;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;

/// The daemon's concrete notifier type.
pub type DaemonNotifier = Notifier<DesktopNotifyAdapter>;

/// Shared state for all fan-out handlers.
#[derive(Clone)]
pub struct AppState {
    pub log: EventLog,
    pub orchestrator: Orchestrator,
    pub notifier: Arc<DaemonNotifier>,
    pub conversation: Arc<ConversationFeed>,
    pub start_time: Instant,
}

/// Build the fan-out router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Read surface
        .route("/api/v1/tasks", get(rest::list_tasks))
        .route("/api/v1/tasks/{id}", get(rest::get_task))
        .route("/api/v1/inbox", get(rest::list_inbox))
        .route("/api/v1/builders", get(rest::list_builders))
        .route("/api/v1/conversation", get(rest::get_conversation))
        .route("/api/v1/health", get(rest::health))
        // Write surface (forwards to the orchestrator)
        .route("/api/v1/tasks", post(rest::create_task))
        .route("/api/v1/tasks/{id}/prompt", post(rest::update_prompt))
        .route("/api/v1/tasks/{id}/questions", post(rest::raise_questions))
        .route("/api/v1/tasks/{id}/answers", post(rest::answer_questions))
        .route("/api/v1/tasks/{id}/freeze", post(rest::freeze))
        .route("/api/v1/tasks/{id}/dispatch", post(rest::dispatch))
        .route("/api/v1/tasks/{id}/gate", post(rest::resolve_gate))
        .route("/api/v1/tasks/{id}/cancel", post(rest::cancel))
        .route("/api/v1/tasks/{id}/link", post(rest::link_external))
        .route("/api/v1/inbox/ack", post(rest::acknowledge_inbox))
        .route("/api/v1/conversation", post(rest::post_conversation))
        .route("/api/v1/quick-dispatch", post(rest::quick_dispatch))
        // Live stream
        .route("/ws/events", get(ws::ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the fan-out surface until the process exits.
pub async fn serve(addr: &str, state: AppState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "fan-out listening");
    axum::serve(listener, router(state)).await
}
