// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task orchestrator: the command surface of the control plane.
//!
//! The orchestrator owns the task state machine. It translates external
//! commands (voice tool calls, dashboard actions) into validated events
//! appended through the event log, and coordinates the prompt workspace
//! and the session pool around those appends. It is the only component
//! that constructs status-changing events; adapters publish observations.

mod dispatch;

use crate::DaemonPool;
use cvr_adapters::PoolError;
use cvr_core::event::{EventBody, ProposedEvent};
use cvr_core::id::{CommandId, TaskId, TopicSlug};
use cvr_core::task::{Priority, Task, TaskStatus};
use cvr_prompts::{FrozenHandoff, PromptError, PromptWorkspace};
use cvr_storage::{AppendError, EventLog};
use std::sync::Arc;
use thiserror::Error;

pub use dispatch::QuickDispatchResult;

/// Errors surfaced to command callers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
    #[error(transparent)]
    Append(#[from] AppendError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// The command surface. Cheap to clone; every clone shares the same log,
/// prompt workspace, and pool.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) log: EventLog,
    pub(crate) prompts: Arc<PromptWorkspace>,
    pub(crate) pool: Arc<DaemonPool>,
}

impl Orchestrator {
    pub fn new(log: EventLog, prompts: Arc<PromptWorkspace>, pool: Arc<DaemonPool>) -> Self {
        Self { log, prompts, pool }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn pool(&self) -> &Arc<DaemonPool> {
        &self.pool
    }

    /// Resolve a task by full id or unique prefix.
    pub fn resolve_task(&self, id: &str) -> Result<Task, RuntimeError> {
        self.log
            .with_state(|state| state.find_task(id).cloned())
            .ok_or_else(|| RuntimeError::TaskNotFound(id.to_string()))
    }

    /// Previously recorded outcome for a client command id, if any.
    pub(crate) fn prior_outcome(
        &self,
        command_id: Option<&CommandId>,
    ) -> Option<cvr_storage::CommandRecord> {
        let command_id = command_id?;
        self.log.with_state(|state| state.command_outcome(command_id).cloned())
    }

    /// Create a task in draft. Returns the new id and its topic slug.
    ///
    /// Duplicate command ids return the originally created task.
    pub fn create_task(
        &self,
        title: &str,
        priority: Option<&str>,
        command_id: Option<CommandId>,
    ) -> Result<(TaskId, TopicSlug), RuntimeError> {
        if let Some(record) = self.prior_outcome(command_id.as_ref()) {
            if let Some(task_id) = record.task_id {
                if let Some(task) =
                    self.log.with_state(|state| state.tasks.get(&task_id).cloned())
                {
                    return Ok((task.id, task.topic));
                }
            }
        }

        let priority = match priority {
            None => Priority::Normal,
            Some(p) => {
                Priority::parse(p).ok_or_else(|| RuntimeError::UnknownPriority(p.to_string()))?
            }
        };

        let task_id = TaskId::new();
        let mut topic = TopicSlug::from_title(title);
        let taken = self.log.with_state(|state| state.topics.contains_key(topic.as_str()));
        if taken {
            // Disambiguate colliding titles with a slice of the task id.
            topic = TopicSlug::new(format!("{}-{}", topic, &task_id.as_str()[4..10]));
        }

        self.log.append(
            ProposedEvent::new(
                task_id,
                EventBody::TaskCreated { title: title.to_string(), priority, topic: topic.clone() },
            )
            .with_command_id(command_id),
        )?;
        Ok((task_id, topic))
    }

    /// Overwrite the working prompt and record the update.
    pub async fn update_working_prompt(
        &self,
        task_id: &str,
        delta_summary: &str,
        content: &str,
        command_id: Option<CommandId>,
    ) -> Result<std::path::PathBuf, RuntimeError> {
        let task = self.resolve_task(task_id)?;
        if self.prior_outcome(command_id.as_ref()).is_some() {
            return Ok(self.prompts.working_path(&task.topic));
        }

        // Pre-validate so a rejected event never leaves a file behind.
        let body = EventBody::WorkingPromptUpdated {
            delta_summary: delta_summary.to_string(),
            path: self.prompts.working_path(&task.topic),
        };
        task.status
            .apply(&body)
            .map_err(|e| RuntimeError::InvalidState(e.to_string()))?;

        let path = self.prompts.update_working(&task.topic, content).await?;
        self.append_or_noop(
            ProposedEvent::new(
                task.id,
                EventBody::WorkingPromptUpdated {
                    delta_summary: delta_summary.to_string(),
                    path: path.clone(),
                },
            )
            .with_command_id(command_id),
        )?;
        Ok(path)
    }

    /// Record open questions, parking the task on the user.
    pub fn raise_questions(
        &self,
        task_id: &str,
        questions: Vec<String>,
        command_id: Option<CommandId>,
    ) -> Result<(), RuntimeError> {
        let task = self.resolve_task(task_id)?;
        self.append_or_noop(
            ProposedEvent::new(task.id, EventBody::QuestionsRaised { questions })
                .with_command_id(command_id),
        )?;
        Ok(())
    }

    /// Record the user's answers, resuming refinement.
    pub fn answer_questions(
        &self,
        task_id: &str,
        answers: serde_json::Value,
        command_id: Option<CommandId>,
    ) -> Result<(), RuntimeError> {
        let task = self.resolve_task(task_id)?;
        self.append_or_noop(
            ProposedEvent::new(task.id, EventBody::UserAnswered { answers })
                .with_command_id(command_id),
        )?;
        Ok(())
    }

    /// Freeze the working prompt into the immutable handoff pair.
    ///
    /// Idempotent by topic: a repeat returns the existing paths and emits
    /// nothing. When no explicit contract is supplied, a minimal one is
    /// derived from the task.
    pub async fn freeze_prompt(
        &self,
        task_id: &str,
        spec: Option<cvr_core::HandoffSpec>,
        command_id: Option<CommandId>,
    ) -> Result<FrozenHandoff, RuntimeError> {
        let task = self.resolve_task(task_id)?;

        let already = self.log.with_state(|state| {
            state.topics.get(task.topic.as_str()).and_then(|t| t.frozen.clone())
        });
        if let Some(frozen) = already {
            return Ok(FrozenHandoff {
                handoff_md_path: frozen.handoff_md_path,
                handoff_json_path: frozen.handoff_json_path,
                digest: frozen.digest,
                already_frozen: true,
            });
        }

        if task.status != TaskStatus::Refining {
            return Err(RuntimeError::InvalidState(format!(
                "freeze requires refining, task {} is {}",
                task.id, task.status
            )));
        }

        let spec = spec.unwrap_or_else(|| self.derive_spec(&task));
        let working = self.prompts.read_working(&task.topic).await?;
        let markdown = format!("# Handoff: {}\n\n{}", task.title, working);
        let frozen = self.prompts.freeze(&task.topic, &markdown, &spec).await?;

        if !frozen.already_frozen {
            self.append_or_noop(
                ProposedEvent::new(
                    task.id,
                    EventBody::HandoffFrozen {
                        topic: task.topic.clone(),
                        handoff_md_path: frozen.handoff_md_path.clone(),
                        handoff_json_path: frozen.handoff_json_path.clone(),
                        digest: frozen.digest.clone(),
                    },
                )
                .with_command_id(command_id),
            )?;
        }
        Ok(frozen)
    }

    /// Attach an external task-graph pointer. Idempotent for the same
    /// value; a different value is a conflict.
    pub fn link_external(
        &self,
        task_id: &str,
        external_task_id: &str,
        command_id: Option<CommandId>,
    ) -> Result<(), RuntimeError> {
        let task = self.resolve_task(task_id)?;
        self.append_or_noop(
            ProposedEvent::new(
                task.id,
                EventBody::ExternalTaskLinked { external_task_id: external_task_id.to_string() },
            )
            .with_command_id(command_id),
        )?;
        Ok(())
    }

    /// Send user input into the task's live builder session (held while a
    /// gate is pending).
    pub async fn send_input(&self, task_id: &str, content: &str) -> Result<(), RuntimeError> {
        let task = self.resolve_task(task_id)?;
        self.pool.send_user_input(&task.id, content).await?;
        Ok(())
    }

    /// Minimal execution contract derived from a task's current state.
    fn derive_spec(&self, task: &Task) -> cvr_core::HandoffSpec {
        cvr_core::HandoffSpec::new(task.title.clone())
            .gates(cvr_core::GateFlags { write: true, run: true, destructive: false })
            .context_pointers(cvr_core::ContextPointers {
                external_task_id: task.external_task_id.clone(),
                artifact_paths: Vec::new(),
            })
    }

    /// Append, treating an idempotency-duplicate as success.
    pub(crate) fn append_or_noop(
        &self,
        proposed: ProposedEvent,
    ) -> Result<Option<cvr_core::Event>, RuntimeError> {
        match self.log.append(proposed) {
            Ok(event) => Ok(Some(event)),
            Err(AppendError::Duplicate { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "../orchestrator_tests/mod.rs"]
mod tests;
