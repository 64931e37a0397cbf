// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch, gate resolution, cancellation, and quick dispatch.

use super::{Orchestrator, RuntimeError};
use cvr_adapters::{AbortOutcome, DispatchOutcome, DispatchRequest};
use cvr_core::event::{CancelPhase, EventBody, ProposedEvent};
use cvr_core::handoff::GateKind;
use cvr_core::id::{CommandId, TaskId};
use cvr_core::session::SessionId;
use cvr_core::task::TaskStatus;
use cvr_storage::FrozenInfo;

/// Outcome of a quick dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum QuickDispatchResult {
    Executed { task_id: TaskId, session_id: SessionId },
    Blocked { task_id: TaskId, reason: String },
}

impl Orchestrator {
    /// Dispatch a frozen handoff to a builder.
    ///
    /// Requires `ready_to_handoff` (or an in-flight session for the same
    /// handoff digest, which makes the call an idempotent repeat).
    pub async fn dispatch(
        &self,
        task_id: &str,
        builder_kind: &str,
        command_id: Option<CommandId>,
    ) -> Result<DispatchOutcome, RuntimeError> {
        let _ = command_id; // Dispatch idempotency rides the token, not the command id.
        let task = self.resolve_task(task_id)?;
        let frozen = self.frozen_info(&task)?;

        let repeatable = matches!(
            task.status,
            TaskStatus::ReadyToHandoff | TaskStatus::HandedOff | TaskStatus::Running
        );
        if !repeatable {
            return Err(RuntimeError::InvalidState(format!(
                "dispatch requires ready_to_handoff, task {} is {}",
                task.id, task.status
            )));
        }

        let outcome = self
            .pool
            .dispatch(DispatchRequest {
                task_id: task.id,
                topic: task.topic.clone(),
                builder_kind: builder_kind.to_string(),
                handoff_md_path: frozen.handoff_md_path,
                handoff_json_path: frozen.handoff_json_path,
                handoff_digest: frozen.digest,
            })
            .await?;
        Ok(outcome)
    }

    /// Resolve the pending gate for a task and forward the decision.
    pub async fn resolve_gate(
        &self,
        task_id: &str,
        approve: bool,
        command_id: Option<CommandId>,
    ) -> Result<(), RuntimeError> {
        let task = self.resolve_task(task_id)?;
        if task.status != TaskStatus::AwaitingGate {
            return Err(RuntimeError::InvalidState(format!(
                "no pending gate, task {} is {}",
                task.id, task.status
            )));
        }
        let gate = self.pending_gate(&task.id).unwrap_or(GateKind::Write);

        let body = if approve {
            EventBody::GateApproved { gate }
        } else {
            EventBody::GateDenied { gate, reason: None }
        };
        self.append_or_noop(ProposedEvent::new(task.id, body).with_command_id(command_id))?;

        // The state machine is the source of status truth; a forwarding
        // failure is logged and surfaces later through the stream.
        if let Err(e) = self.pool.resolve_gate(&task.id, gate, approve).await {
            tracing::warn!(task = %task.id, error = %e, "gate resolution forwarding failed");
        }
        Ok(())
    }

    /// Cancel a task cooperatively.
    ///
    /// Appends `TaskCanceled(pending)` immediately (auto-denying a pending
    /// gate first), then attempts the remote abort in the background; the
    /// confirmation phase is appended when the abort resolves.
    pub async fn cancel(
        &self,
        task_id: &str,
        reason: &str,
        command_id: Option<CommandId>,
    ) -> Result<(), RuntimeError> {
        let task = self.resolve_task(task_id)?;
        if task.status.is_terminal() {
            return Err(RuntimeError::InvalidState(format!(
                "task {} already {}",
                task.id, task.status
            )));
        }

        // Cancellation during a gate auto-denies it first.
        if task.status == TaskStatus::AwaitingGate {
            let gate = self.pending_gate(&task.id).unwrap_or(GateKind::Write);
            self.append_or_noop(ProposedEvent::new(
                task.id,
                EventBody::GateDenied { gate, reason: Some("task canceled".into()) },
            ))?;
            if let Err(e) = self.pool.resolve_gate(&task.id, gate, false).await {
                tracing::debug!(task = %task.id, error = %e, "gate auto-deny forwarding failed");
            }
        }

        self.append_or_noop(
            ProposedEvent::new(
                task.id,
                EventBody::TaskCanceled {
                    reason: reason.to_string(),
                    phase: CancelPhase::Pending,
                },
            )
            .with_command_id(command_id),
        )?;

        let this = self.clone();
        let reason = reason.to_string();
        let id = task.id;
        tokio::spawn(async move {
            let outcome = this.pool.abort(&id).await;
            let phase = match outcome {
                AbortOutcome::Confirmed => CancelPhase::Confirmed,
                AbortOutcome::Unconfirmed => CancelPhase::Unconfirmed,
            };
            if let Err(e) =
                this.log.append(ProposedEvent::new(id, EventBody::TaskCanceled { reason, phase }))
            {
                tracing::warn!(task = %id, error = %e, "cancel confirmation append failed");
            }
        });
        Ok(())
    }

    /// Capture, freeze, and dispatch in one stroke.
    ///
    /// An explicit execution contract may be supplied; otherwise a minimal
    /// one is derived from the task. Emits `QuickDispatchRequested`, then
    /// either `QuickDispatchExecuted` or `QuickDispatchBlocked` (unknown
    /// builder, pool at capacity, or a contract demanding the destructive
    /// gate).
    pub async fn quick_dispatch(
        &self,
        title: &str,
        prompt: &str,
        builder_kind: &str,
        spec: Option<cvr_core::HandoffSpec>,
        command_id: Option<CommandId>,
    ) -> Result<QuickDispatchResult, RuntimeError> {
        if let Some(record) = self.prior_outcome(command_id.as_ref()) {
            if let Some(task_id) = record.task_id {
                if let Some(task) =
                    self.log.with_state(|state| state.tasks.get(&task_id).cloned())
                {
                    return Ok(match task.builder_session_id {
                        Some(session_id) => {
                            QuickDispatchResult::Executed { task_id: task.id, session_id }
                        }
                        None => QuickDispatchResult::Blocked {
                            task_id: task.id,
                            reason: "previously blocked".into(),
                        },
                    });
                }
            }
        }

        let (task_id, _topic) = self.create_task(title, None, command_id)?;
        self.update_working_prompt(task_id.as_str(), "quick capture", prompt, None)
            .await?;

        let mut summary = prompt.lines().next().unwrap_or_default().to_string();
        summary.truncate(80);
        self.append_or_noop(ProposedEvent::new(
            task_id,
            EventBody::QuickDispatchRequested {
                builder_kind: builder_kind.to_string(),
                summary,
            },
        ))?;

        let task = self.resolve_task(task_id.as_str())?;
        let spec = spec.unwrap_or_else(|| self.derive_spec(&task));

        if let Some(reason) = self.quick_dispatch_blocker(builder_kind, &spec) {
            self.append_or_noop(ProposedEvent::new(
                task_id,
                EventBody::QuickDispatchBlocked { reason: reason.clone() },
            ))?;
            return Ok(QuickDispatchResult::Blocked { task_id, reason });
        }

        self.freeze_prompt(task_id.as_str(), Some(spec), None).await?;
        let outcome = self.dispatch(task_id.as_str(), builder_kind, None).await?;
        self.append_or_noop(ProposedEvent::new(
            task_id,
            EventBody::QuickDispatchExecuted { session_id: outcome.session_id.clone() },
        ))?;
        Ok(QuickDispatchResult::Executed { task_id, session_id: outcome.session_id })
    }

    /// Why a quick dispatch cannot go ahead right now, if anything.
    ///
    /// A contract demanding the destructive gate never qualifies; it must
    /// take the full refine-and-review path.
    fn quick_dispatch_blocker(
        &self,
        builder_kind: &str,
        spec: &cvr_core::HandoffSpec,
    ) -> Option<String> {
        if self.pool.registry().get(builder_kind).is_none() {
            return Some(format!("unknown builder kind {}", builder_kind));
        }
        if !self.pool.can_admit(builder_kind) {
            return Some(format!("builder {} at session capacity", builder_kind));
        }
        if spec.gates.destructive {
            return Some("handoff demands the destructive gate".into());
        }
        None
    }

    fn frozen_info(&self, task: &cvr_core::Task) -> Result<FrozenInfo, RuntimeError> {
        self.log
            .with_state(|state| {
                state.topics.get(task.topic.as_str()).and_then(|t| t.frozen.clone())
            })
            .ok_or_else(|| {
                RuntimeError::InvalidState(format!("task {} has no frozen handoff", task.id))
            })
    }

    fn pending_gate(&self, task_id: &TaskId) -> Option<GateKind> {
        self.log.with_state(|state| {
            state.live_session_for(task_id).and_then(|s| s.pending_gate)
        })
    }
}
