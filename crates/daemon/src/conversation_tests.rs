// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cvr_wire::ConversationRole;

#[test]
fn cursors_are_monotonic() {
    let feed = ConversationFeed::new();
    let a = feed.append(ConversationRole::User, "fix the login bug", 1);
    let b = feed.append(ConversationRole::Assistant, "on it", 2);
    assert_eq!(a.cursor, 1);
    assert_eq!(b.cursor, 2);
}

#[test]
fn entries_after_resumes_exactly() {
    let feed = ConversationFeed::new();
    for i in 0..5 {
        feed.append(ConversationRole::User, &format!("msg {}", i), i);
    }
    let tail = feed.entries_after(3);
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].cursor, 4);
    assert_eq!(tail[1].cursor, 5);
}

#[test]
fn rolling_buffer_drops_oldest() {
    let feed = ConversationFeed::new();
    for i in 0..1500u64 {
        feed.append(ConversationRole::User, "x", i);
    }
    let all = feed.entries_after(0);
    assert_eq!(all.len(), 1024);
    // Cursors keep counting even though old entries are gone.
    assert_eq!(all.last().unwrap().cursor, 1500);
}

#[tokio::test]
async fn subscribers_receive_appends() {
    let feed = ConversationFeed::new();
    let mut rx = feed.subscribe();
    feed.append(ConversationRole::Assistant, "done", 9);
    let entry = rx.recv().await.unwrap();
    assert_eq!(entry.text, "done");
    assert_eq!(entry.role, ConversationRole::Assistant);
}
