// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests: every request/response round-trips through the frame
//! codec unchanged.

use crate::{decode, encode, Request, Response};
use proptest::prelude::*;

fn arb_request() -> impl Strategy<Value = Request> {
    prop_oneof![
        Just(Request::Ping),
        Just(Request::GetStatus),
        Just(Request::PollPendingDelivery),
        Just(Request::Shutdown),
        ".{0,40}".prop_map(|title| Request::CreateTask {
            title,
            priority: None,
            command_id: None,
        }),
        (".{1,20}", ".{0,40}").prop_map(|(task_id, content)| Request::UpdateWorkingPrompt {
            task_id,
            delta_summary: "edit".into(),
            content,
            command_id: None,
        }),
        (".{1,20}", any::<bool>()).prop_map(|(task_id, approve)| Request::ResolveGate {
            task_id,
            approve,
            command_id: None,
        }),
        (".{1,20}", ".{0,40}").prop_map(|(task_id, reason)| Request::Cancel {
            task_id,
            reason,
            command_id: None,
        }),
        prop::collection::vec(".{0,16}", 0..4)
            .prop_map(|ids| Request::AcknowledgeInbox { ids }),
    ]
}

fn arb_response() -> impl Strategy<Value = Response> {
    prop_oneof![
        Just(Response::Ok),
        Just(Response::Pong),
        Just(Response::ShuttingDown),
        (".{1,20}", ".{1,20}").prop_map(|(task_id, topic)| Response::TaskCreated {
            task_id,
            topic,
        }),
        (".{1,20}", ".{1,20}", any::<bool>()).prop_map(|(task_id, session_id, reused)| {
            Response::Dispatched { task_id, session_id, reused }
        }),
        ".{0,60}".prop_map(|message| Response::Error { message }),
    ]
}

proptest! {
    #[test]
    fn requests_roundtrip(request in arb_request()) {
        let frame = encode(&request).unwrap();
        let back: Request = decode(&frame[4..]).unwrap();
        prop_assert_eq!(back, request);
    }

    #[test]
    fn responses_roundtrip(response in arb_response()) {
        let frame = encode(&response).unwrap();
        let back: Response = decode(&frame[4..]).unwrap();
        prop_assert_eq!(back, response);
    }
}
