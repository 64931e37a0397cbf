// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for the voice tool surface.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The same
//! DTOs serve the fan-out REST responses and the `/ws/events` broadcast.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod request;
mod response;
mod types;
mod wire;

pub use request::Request;
pub use response::Response;
pub use types::{
    BuilderStatusUpdate, BuilderSummary, ContextHitEntry, ConversationEntry, ConversationRole,
    DeliveryHint, InboxEntry, SessionSummary, SystemHealthSummary, TaskDetail, TaskSummary,
    TaskUpdate, WsMessage,
};
pub use wire::{decode, encode, read_message, write_message, ProtocolError};
pub use wire::{read_request, write_response};

#[cfg(test)]
mod property_tests;
