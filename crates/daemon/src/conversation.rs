// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation feed: the user/assistant utterance log.
//!
//! Deliberately separate from the durable domain log — a bounded rolling
//! buffer with its own monotonic cursor. The WebSocket broadcast gives it
//! the same in-order, cursor-resumable delivery as domain events; history
//! past the buffer cap is gone, which is acceptable for a transcript view.

use cvr_wire::{ConversationEntry, ConversationRole};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::broadcast;

/// Entries kept in the rolling buffer.
const FEED_CAP: usize = 1024;

/// Bounded in-memory conversation feed.
pub struct ConversationFeed {
    inner: Mutex<FeedInner>,
    tx: broadcast::Sender<ConversationEntry>,
}

struct FeedInner {
    entries: VecDeque<ConversationEntry>,
    next_cursor: u64,
}

impl Default for ConversationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(FeedInner { entries: VecDeque::new(), next_cursor: 1 }),
            tx,
        }
    }

    /// Append one utterance and broadcast it.
    pub fn append(&self, role: ConversationRole, text: &str, time_ms: u64) -> ConversationEntry {
        let entry = {
            let mut inner = self.inner.lock();
            let entry = ConversationEntry {
                cursor: inner.next_cursor,
                role,
                text: text.to_string(),
                time_ms,
            };
            inner.next_cursor += 1;
            inner.entries.push_back(entry.clone());
            while inner.entries.len() > FEED_CAP {
                inner.entries.pop_front();
            }
            entry
        };
        let _ = self.tx.send(entry.clone());
        entry
    }

    /// Entries with cursor strictly greater than `after`, oldest first.
    pub fn entries_after(&self, after: u64) -> Vec<ConversationEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.cursor > after)
            .cloned()
            .collect()
    }

    /// Live tail of new entries.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEntry> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
#[path = "conversation_tests.rs"]
mod tests;
