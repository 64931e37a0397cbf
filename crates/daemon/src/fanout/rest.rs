// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers for the fan-out surface.

use super::AppState;
use crate::orchestrator::{QuickDispatchResult, RuntimeError};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cvr_core::id::{CommandId, InboxId};
use cvr_core::SystemClock;
use cvr_core::Clock;
use cvr_storage::AppendError;
use cvr_wire::{
    BuilderSummary, ConversationRole, InboxEntry, SystemHealthSummary, TaskDetail, TaskSummary,
};
use serde::Deserialize;

/// Map command-surface errors onto HTTP statuses.
impl IntoResponse for RuntimeError {
    fn into_response(self) -> Response {
        let status = match &self {
            RuntimeError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            RuntimeError::UnknownPriority(_) => StatusCode::BAD_REQUEST,
            RuntimeError::InvalidState(_) => StatusCode::CONFLICT,
            RuntimeError::Append(AppendError::Validation(_)) => StatusCode::BAD_REQUEST,
            RuntimeError::Append(AppendError::Conflict(_)) => StatusCode::CONFLICT,
            RuntimeError::Append(AppendError::Duplicate { .. }) => StatusCode::OK,
            RuntimeError::Append(AppendError::Busy) => StatusCode::SERVICE_UNAVAILABLE,
            RuntimeError::Append(AppendError::ReadOnly) => StatusCode::SERVICE_UNAVAILABLE,
            RuntimeError::Append(AppendError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RuntimeError::Prompt(_) => StatusCode::CONFLICT,
            RuntimeError::Pool(cvr_adapters::PoolError::UnknownKind(_)) => {
                StatusCode::BAD_REQUEST
            }
            RuntimeError::Pool(cvr_adapters::PoolError::AtCapacity) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RuntimeError::Pool(cvr_adapters::PoolError::Conflict(_)) => StatusCode::CONFLICT,
            RuntimeError::Pool(cvr_adapters::PoolError::Builder(_)) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
pub(super) struct TaskFilter {
    status: Option<String>,
}

pub(super) async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> Json<Vec<TaskSummary>> {
    let mut tasks: Vec<TaskSummary> = state.log.with_state(|s| {
        s.tasks
            .values()
            .filter(|t| match &filter.status {
                Some(wanted) => t.status.to_string() == *wanted,
                None => true,
            })
            .map(TaskSummary::from)
            .collect()
    });
    tasks.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
    Json(tasks)
}

pub(super) async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskDetail>, StatusCode> {
    state
        .log
        .with_state(|s| {
            s.find_task(&id)
                .map(|task| TaskDetail::new(task, s.live_session_for(&task.id).or_else(|| {
                    task.builder_session_id
                        .as_ref()
                        .and_then(|sid| s.sessions.get(sid))
                })))
        })
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub(super) struct InboxFilter {
    #[serde(default)]
    unread: bool,
}

pub(super) async fn list_inbox(
    State(state): State<AppState>,
    Query(filter): Query<InboxFilter>,
) -> Json<Vec<InboxEntry>> {
    Json(state.log.with_state(|s| {
        s.inbox
            .iter()
            .filter(|i| !filter.unread || i.is_unread())
            .map(InboxEntry::from)
            .collect()
    }))
}

pub(super) async fn list_builders(State(state): State<AppState>) -> Json<Vec<BuilderSummary>> {
    let pool = state.orchestrator.pool();
    Json(
        pool.registry()
            .configs()
            .map(|c| BuilderSummary {
                name: c.name.clone(),
                kind: c.kind.clone(),
                endpoint: c.endpoint.clone(),
                live_sessions: pool.live_count(&c.kind),
                max_sessions: c.limits.max_sessions,
            })
            .collect(),
    )
}

#[derive(Deserialize)]
pub(super) struct ConversationFilter {
    #[serde(default)]
    after: u64,
}

pub(super) async fn get_conversation(
    State(state): State<AppState>,
    Query(filter): Query<ConversationFilter>,
) -> Json<Vec<cvr_wire::ConversationEntry>> {
    Json(state.conversation.entries_after(filter.after))
}

pub(super) async fn health(State(state): State<AppState>) -> Json<SystemHealthSummary> {
    let (tasks_active, unread_inbox, last_seq) = state.log.with_state(|s| {
        (
            s.tasks.values().filter(|t| !t.is_terminal()).count(),
            s.unread_count(),
            s.last_seq,
        )
    });
    Json(SystemHealthSummary {
        uptime_secs: state.start_time.elapsed().as_secs(),
        last_seq,
        tasks_active,
        unread_inbox,
        degraded: state.log.is_degraded(),
    })
}

#[derive(Deserialize)]
pub(super) struct CreateTaskBody {
    title: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    command_id: Option<String>,
}

pub(super) async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskBody>,
) -> Result<Json<serde_json::Value>, RuntimeError> {
    let (task_id, topic) = state.orchestrator.create_task(
        &body.title,
        body.priority.as_deref(),
        body.command_id.map(CommandId::new),
    )?;
    Ok(Json(serde_json::json!({ "task_id": task_id.as_str(), "topic": topic.as_str() })))
}

#[derive(Deserialize)]
pub(super) struct UpdatePromptBody {
    delta_summary: String,
    content: String,
    #[serde(default)]
    command_id: Option<String>,
}

pub(super) async fn update_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePromptBody>,
) -> Result<Json<serde_json::Value>, RuntimeError> {
    let path = state
        .orchestrator
        .update_working_prompt(
            &id,
            &body.delta_summary,
            &body.content,
            body.command_id.map(CommandId::new),
        )
        .await?;
    Ok(Json(serde_json::json!({ "path": path })))
}

#[derive(Deserialize)]
pub(super) struct QuestionsBody {
    questions: Vec<String>,
}

pub(super) async fn raise_questions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<QuestionsBody>,
) -> Result<StatusCode, RuntimeError> {
    state.orchestrator.raise_questions(&id, body.questions, None)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub(super) struct AnswersBody {
    answers: serde_json::Value,
}

pub(super) async fn answer_questions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AnswersBody>,
) -> Result<StatusCode, RuntimeError> {
    state.orchestrator.answer_questions(&id, body.answers, None)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Default)]
pub(super) struct FreezeBody {
    #[serde(default)]
    spec: Option<cvr_core::HandoffSpec>,
    #[serde(default)]
    command_id: Option<String>,
}

pub(super) async fn freeze(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<FreezeBody>>,
) -> Result<Json<serde_json::Value>, RuntimeError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let frozen = state
        .orchestrator
        .freeze_prompt(&id, body.spec, body.command_id.map(CommandId::new))
        .await?;
    Ok(Json(serde_json::json!({
        "handoff_md_path": frozen.handoff_md_path,
        "handoff_json_path": frozen.handoff_json_path,
        "digest": frozen.digest,
        "already_frozen": frozen.already_frozen,
    })))
}

#[derive(Deserialize)]
pub(super) struct DispatchBody {
    builder_kind: String,
    #[serde(default)]
    command_id: Option<String>,
}

pub(super) async fn dispatch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DispatchBody>,
) -> Result<Json<serde_json::Value>, RuntimeError> {
    let outcome = state
        .orchestrator
        .dispatch(&id, &body.builder_kind, body.command_id.map(CommandId::new))
        .await?;
    Ok(Json(serde_json::json!({
        "session_id": outcome.session_id.as_str(),
        "reused": outcome.reused,
    })))
}

#[derive(Deserialize)]
pub(super) struct GateBody {
    approve: bool,
}

pub(super) async fn resolve_gate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<GateBody>,
) -> Result<StatusCode, RuntimeError> {
    state.orchestrator.resolve_gate(&id, body.approve, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub(super) struct CancelBody {
    #[serde(default)]
    reason: String,
}

pub(super) async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<StatusCode, RuntimeError> {
    state.orchestrator.cancel(&id, &body.reason, None).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub(super) struct LinkBody {
    external_task_id: String,
}

pub(super) async fn link_external(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LinkBody>,
) -> Result<StatusCode, RuntimeError> {
    state.orchestrator.link_external(&id, &body.external_task_id, None)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub(super) struct AckBody {
    ids: Vec<String>,
}

pub(super) async fn acknowledge_inbox(
    State(state): State<AppState>,
    Json(body): Json<AckBody>,
) -> Json<serde_json::Value> {
    let ids: Vec<InboxId> = body.ids.iter().map(InboxId::from_string).collect();
    let acked = state.notifier.acknowledge(&ids, SystemClock.epoch_ms());
    Json(serde_json::json!({
        "acknowledged": acked.iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>()
    }))
}

#[derive(Deserialize)]
pub(super) struct UtteranceBody {
    role: ConversationRole,
    text: String,
}

pub(super) async fn post_conversation(
    State(state): State<AppState>,
    Json(body): Json<UtteranceBody>,
) -> Json<cvr_wire::ConversationEntry> {
    Json(state.conversation.append(body.role, &body.text, SystemClock.epoch_ms()))
}

#[derive(Deserialize)]
pub(super) struct QuickDispatchBody {
    title: String,
    prompt: String,
    builder_kind: String,
    #[serde(default)]
    spec: Option<cvr_core::HandoffSpec>,
    #[serde(default)]
    command_id: Option<String>,
}

/// Quick dispatch rides the tool surface normally, but the dashboard can
/// trigger it too.
pub(super) async fn quick_dispatch(
    State(state): State<AppState>,
    Json(body): Json<QuickDispatchBody>,
) -> Result<Json<serde_json::Value>, RuntimeError> {
    let result = state
        .orchestrator
        .quick_dispatch(
            &body.title,
            &body.prompt,
            &body.builder_kind,
            body.spec,
            body.command_id.map(CommandId::new),
        )
        .await?;
    Ok(Json(match result {
        QuickDispatchResult::Executed { task_id, session_id } => serde_json::json!({
            "task_id": task_id.as_str(), "session_id": session_id.as_str(), "blocked": false,
        }),
        QuickDispatchResult::Blocked { task_id, reason } => serde_json::json!({
            "task_id": task_id.as_str(), "reason": reason, "blocked": true,
        }),
    }))
}
