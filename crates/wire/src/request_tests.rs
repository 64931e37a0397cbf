// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn requests_tag_by_type() {
    let json = serde_json::to_value(Request::GetStatus).unwrap();
    assert_eq!(json["type"], "GetStatus");

    let json = serde_json::to_value(Request::Dispatch {
        task_id: "tsk-1".into(),
        builder_kind: "default".into(),
        command_id: None,
    })
    .unwrap();
    assert_eq!(json["type"], "Dispatch");
    assert!(json.get("command_id").is_none());
}

#[test]
fn optional_fields_default_on_deserialize() {
    let request: Request =
        serde_json::from_str(r#"{"type":"CreateTask","title":"fix it"}"#).unwrap();
    match request {
        Request::CreateTask { title, priority, command_id } => {
            assert_eq!(title, "fix it");
            assert!(priority.is_none());
            assert!(command_id.is_none());
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn freeze_accepts_inline_spec() {
    let request: Request = serde_json::from_str(
        r#"{"type":"FreezePrompt","task_id":"tsk-1","spec":{"version":1,"goal":"do the thing"}}"#,
    )
    .unwrap();
    match request {
        Request::FreezePrompt { spec: Some(spec), .. } => {
            assert_eq!(spec.goal, "do the thing");
        }
        other => panic!("unexpected: {:?}", other),
    }
}
