// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task and topic state derived from prompt-lifecycle events.

use super::{CoreState, FrozenInfo, TopicRecord};
use cvr_core::event::{Event, EventBody};
use cvr_core::task::{Task, TaskStatus};

pub(super) fn apply(state: &mut CoreState, event: &Event) {
    match &event.body {
        EventBody::TaskCreated { title, priority, topic } => {
            let Some(task_id) = event.task_id else {
                return;
            };
            let created_at_ms = event.time.timestamp_millis() as u64;
            state.tasks.entry(task_id).or_insert_with(|| Task {
                id: task_id,
                title: title.clone(),
                status: TaskStatus::Draft,
                priority: *priority,
                topic: topic.clone(),
                working_prompt_path: None,
                handoff_prompt_path: None,
                handoff_spec_path: None,
                external_task_id: None,
                builder_session_id: None,
                builder_kind: None,
                last_event_seq: event.seq,
                created_at_ms,
                updated_at_ms: created_at_ms,
            });
            state.topics.entry(topic.as_str().to_string()).or_default();
        }

        EventBody::WorkingPromptUpdated { path, .. } => {
            let topic = event.task_id.and_then(|id| state.tasks.get_mut(&id)).map(|task| {
                task.working_prompt_path = Some(path.clone());
                task.topic.as_str().to_string()
            });
            if let Some(topic) = topic {
                state.topics.entry(topic).or_default().working_path = Some(path.clone());
            }
        }

        EventBody::HandoffFrozen { topic, handoff_md_path, handoff_json_path, digest } => {
            if let Some(task) = event.task_id.and_then(|id| state.tasks.get_mut(&id)) {
                task.handoff_prompt_path = Some(handoff_md_path.clone());
                task.handoff_spec_path = Some(handoff_json_path.clone());
            }
            let record: &mut TopicRecord =
                state.topics.entry(topic.as_str().to_string()).or_default();
            // Freeze-once: a replayed or duplicate event never overwrites.
            if record.frozen.is_none() {
                record.frozen = Some(FrozenInfo {
                    handoff_md_path: handoff_md_path.clone(),
                    handoff_json_path: handoff_json_path.clone(),
                    digest: digest.clone(),
                    seq: event.seq,
                });
            }
        }

        EventBody::ExternalTaskLinked { external_task_id } => {
            if let Some(task) = event.task_id.and_then(|id| state.tasks.get_mut(&id)) {
                // Once set, never reassigned.
                if task.external_task_id.is_none() {
                    task.external_task_id = Some(external_task_id.clone());
                }
            }
        }

        // Pure status/bookkeeping events for this module.
        EventBody::QuestionsRaised { .. }
        | EventBody::UserAnswered { .. }
        | EventBody::QuickDispatchRequested { .. }
        | EventBody::QuickDispatchExecuted { .. }
        | EventBody::QuickDispatchBlocked { .. } => {}

        _ => {}
    }

    state.touch_task(event);
}
