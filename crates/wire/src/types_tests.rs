// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cvr_core::task::Task;

#[test]
fn task_summary_from_task() {
    let task = Task::builder().title("fix auth").build();
    let summary = TaskSummary::from(&task);
    assert_eq!(summary.title, "fix auth");
    assert_eq!(summary.status, cvr_core::task::TaskStatus::Draft);
    assert_eq!(summary.id, task.id.as_str());
}

#[test]
fn ws_messages_tag_snake_case() {
    let msg = WsMessage::TaskUpdate(TaskUpdate {
        seq: 9,
        task: TaskSummary::from(&Task::builder().build()),
    });
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "task_update");
    assert_eq!(json["data"]["seq"], 9);
    assert_eq!(msg.seq(), Some(9));
}

#[test]
fn conversation_entries_have_no_domain_seq() {
    let msg = WsMessage::ConversationEntry(ConversationEntry {
        cursor: 3,
        role: ConversationRole::User,
        text: "cancel that".into(),
        time_ms: 1,
    });
    assert_eq!(msg.seq(), None);
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "conversation_entry");
    assert_eq!(json["data"]["role"], "user");
}

#[test]
fn inbox_entry_reflects_read_state() {
    let item = cvr_core::inbox::InboxItem {
        id: cvr_core::id::InboxId::from_string("inb-1"),
        severity: cvr_core::inbox::Severity::Blocking,
        summary: "needs approval".into(),
        detail: None,
        task_id: None,
        event_seq: 4,
        created_at_ms: 10,
        read_at_ms: None,
    };
    let entry = InboxEntry::from(&item);
    assert!(!entry.read);
    assert_eq!(entry.event_seq, 4);
}
