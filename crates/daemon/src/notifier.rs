// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox notifier: backpressure-aware delivery hints for the voice layer.
//!
//! Inbox items themselves are derived inside the event log; this component
//! shapes their delivery. Blocking items are flagged deliver-immediately
//! (and go out as desktop notifications); info/success items coalesce per
//! task within a window into a single "N updates" hint. The voice layer
//! calls `poll_pending_delivery`/`acknowledge` at natural pauses.

use cvr_adapters::NotifyAdapter;
use cvr_core::id::{InboxId, TaskId};
use cvr_core::inbox::Severity;
use cvr_storage::EventLog;
use cvr_wire::DeliveryHint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

struct PendingHint {
    immediate: bool,
    summary: String,
    task_id: Option<TaskId>,
    item_ids: Vec<InboxId>,
    created_at_ms: u64,
    /// Hint becomes pollable at this time (coalescing window).
    ready_at_ms: u64,
    /// Open coalescing bucket key (task id) for info/success hints.
    coalesce_key: Option<String>,
}

/// Delivery-hint queue over the inbox.
pub struct Notifier<N: NotifyAdapter> {
    log: EventLog,
    notify: N,
    pending: Mutex<Vec<PendingHint>>,
    coalesce_window_ms: u64,
    /// Read marks persisted for fast boot (`inbox/marks.json`).
    marks_path: PathBuf,
}

impl<N: NotifyAdapter> Notifier<N> {
    pub fn new(log: EventLog, notify: N, coalesce_window_ms: u64, marks_path: PathBuf) -> Self {
        Self {
            log,
            notify,
            pending: Mutex::new(Vec::new()),
            coalesce_window_ms,
            marks_path,
        }
    }

    /// Follow the event stream and derive delivery hints. Runs until the
    /// process exits.
    pub fn spawn(self: Arc<Self>) {
        let mut subscription = self.log.subscribe(self.log.last_seq());
        tokio::spawn(async move {
            loop {
                let event = subscription.recv().await;
                self.observe(&event).await;
            }
        });
    }

    /// Derive a hint (or fold into an open bucket) for one event.
    pub async fn observe(&self, event: &cvr_core::Event) {
        let Some(severity) = cvr_core::inbox::severity_for(&event.body) else {
            return;
        };
        let Some(item) = self.log.with_state(|state| {
            state.inbox.iter().find(|i| i.event_seq == event.seq).cloned()
        }) else {
            return;
        };

        match severity {
            Severity::Blocking => {
                self.push_hint(PendingHint {
                    immediate: true,
                    summary: item.summary.clone(),
                    task_id: item.task_id,
                    item_ids: vec![item.id],
                    created_at_ms: item.created_at_ms,
                    ready_at_ms: item.created_at_ms,
                    coalesce_key: None,
                });
                if let Err(e) = self.notify.notify("Conversator", &item.summary).await {
                    tracing::warn!(error = %e, "desktop notification failed");
                }
            }
            Severity::Error | Severity::Warning => {
                self.push_hint(PendingHint {
                    immediate: false,
                    summary: item.summary,
                    task_id: item.task_id,
                    item_ids: vec![item.id],
                    created_at_ms: item.created_at_ms,
                    ready_at_ms: item.created_at_ms,
                    coalesce_key: None,
                });
            }
            Severity::Info | Severity::Success => {
                let key = item
                    .task_id
                    .map(|id| id.as_str().to_string())
                    .unwrap_or_else(|| "general".to_string());
                let title = self.task_title(item.task_id);
                let mut pending = self.pending.lock();
                if let Some(open) = pending
                    .iter_mut()
                    .find(|h| h.coalesce_key.as_deref() == Some(key.as_str()))
                {
                    open.item_ids.push(item.id);
                    open.summary = format!("{} updates on {}", open.item_ids.len(), title);
                } else {
                    pending.push(PendingHint {
                        immediate: false,
                        summary: item.summary,
                        task_id: item.task_id,
                        item_ids: vec![item.id],
                        created_at_ms: item.created_at_ms,
                        ready_at_ms: item.created_at_ms + self.coalesce_window_ms,
                        coalesce_key: Some(key),
                    });
                }
            }
        }
    }

    fn push_hint(&self, hint: PendingHint) {
        self.pending.lock().push(hint);
    }

    fn task_title(&self, task_id: Option<TaskId>) -> String {
        task_id
            .and_then(|id| self.log.with_state(|s| s.tasks.get(&id).map(|t| t.title.clone())))
            .unwrap_or_else(|| "task".to_string())
    }

    /// Hints ready for delivery. Blocking hints sort ahead of everything
    /// regardless of age; within a class, creation order holds.
    pub fn poll_pending_delivery(&self, now_ms: u64) -> Vec<DeliveryHint> {
        let mut pending = self.pending.lock();
        let mut ready: Vec<PendingHint> = Vec::new();
        let mut keep: Vec<PendingHint> = Vec::new();
        for hint in pending.drain(..) {
            if hint.immediate || hint.ready_at_ms <= now_ms {
                ready.push(hint);
            } else {
                keep.push(hint);
            }
        }
        *pending = keep;
        drop(pending);

        ready.sort_by_key(|h| (!h.immediate, h.created_at_ms));
        ready
            .into_iter()
            .map(|h| DeliveryHint {
                immediate: h.immediate,
                summary: h.summary,
                task_id: h.task_id.map(|id| id.as_str().to_string()),
                item_ids: h.item_ids.iter().map(|id| id.as_str().to_string()).collect(),
                created_at_ms: h.created_at_ms,
            })
            .collect()
    }

    /// Acknowledge inbox items: marks them read, persists the marks for
    /// fast boot, and drops any pending hints they covered.
    pub fn acknowledge(&self, ids: &[InboxId], now_ms: u64) -> Vec<InboxId> {
        let acked = self.log.acknowledge_inbox(ids, now_ms);
        if !acked.is_empty() {
            self.persist_marks();
            let mut pending = self.pending.lock();
            pending.retain(|h| !h.item_ids.iter().all(|id| acked.contains(id)));
        }
        acked
    }

    /// Count of unread inbox items.
    pub fn unread_count(&self) -> usize {
        self.log.with_state(|state| state.unread_count())
    }

    fn persist_marks(&self) {
        let marks: HashMap<String, u64> = self.log.with_state(|state| {
            state
                .inbox
                .iter()
                .filter_map(|i| i.read_at_ms.map(|ms| (i.id.as_str().to_string(), ms)))
                .collect()
        });
        if let Some(parent) = self.marks_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_vec(&marks) {
            Ok(bytes) => {
                let tmp = self.marks_path.with_extension("json.tmp");
                let write = std::fs::write(&tmp, bytes)
                    .and_then(|_| std::fs::rename(&tmp, &self.marks_path));
                if let Err(e) = write {
                    tracing::warn!(error = %e, "failed to persist inbox read marks");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode inbox read marks"),
        }
    }
}

/// Load persisted read marks at boot (missing file is an empty map).
pub fn load_read_marks(path: &std::path::Path) -> HashMap<String, u64> {
    std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;
