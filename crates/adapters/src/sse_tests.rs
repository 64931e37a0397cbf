// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::builder::{RemoteEvent, StreamFrame};

fn feed(parser: &mut SseParser, lines: &[&str]) -> Vec<StreamFrame> {
    let mut out = Vec::new();
    for line in lines {
        if let Some(frame) = parser.feed_line(line) {
            out.push(frame);
        }
    }
    out
}

#[test]
fn parses_status_frame() {
    let mut parser = SseParser::new(0);
    let frames = feed(
        &mut parser,
        &["event: status", "id: 3", r#"data: {"status":"running"}"#, ""],
    );
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].cursor, 3);
    assert_eq!(
        frames[0].event,
        RemoteEvent::Status { status: "running".into(), reason: None }
    );
}

#[test]
fn parses_gate_frame_with_detail() {
    let mut parser = SseParser::new(0);
    let frames = feed(
        &mut parser,
        &[
            "event: gate",
            "id: 7",
            r#"data: {"kind":"write","detail":{"files":["src/auth/mw.ts"]}}"#,
            "",
        ],
    );
    assert_eq!(frames.len(), 1);
    match &frames[0].event {
        RemoteEvent::Gate { kind, detail } => {
            assert_eq!(kind, "write");
            assert_eq!(detail["files"][0], "src/auth/mw.ts");
        }
        other => panic!("expected gate, got {:?}", other),
    }
}

#[test]
fn parses_completed_with_artifacts() {
    let mut parser = SseParser::new(0);
    let frames = feed(
        &mut parser,
        &[
            "event: completed",
            r#"data: {"artifacts":[{"kind":"diff","path":"diff-2026-01-12.md"}]}"#,
            "",
        ],
    );
    match &frames[0].event {
        RemoteEvent::Completed { artifacts } => {
            assert_eq!(artifacts.len(), 1);
            assert_eq!(artifacts[0].kind, "diff");
        }
        other => panic!("expected completed, got {:?}", other),
    }
}

#[test]
fn multi_line_data_joined() {
    let mut parser = SseParser::new(0);
    let frames = feed(
        &mut parser,
        &["event: failed", r#"data: {"reason":"#, r#"data: "boom"}"#, ""],
    );
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, RemoteEvent::Failed { reason: "boom".into() });
}

#[test]
fn unrecognized_events_dropped() {
    let mut parser = SseParser::new(0);
    let frames = feed(
        &mut parser,
        &["event: telemetry", r#"data: {"cpu":0.5}"#, "", "event: status", r#"data: {"status":"running"}"#, ""],
    );
    // Only the status frame survives translation.
    assert_eq!(frames.len(), 1);
}

#[test]
fn malformed_payload_dropped() {
    let mut parser = SseParser::new(0);
    let frames = feed(&mut parser, &["event: status", "data: {not json", ""]);
    assert!(frames.is_empty());
}

#[test]
fn comments_and_keepalives_ignored() {
    let mut parser = SseParser::new(0);
    let frames = feed(
        &mut parser,
        &[": keepalive", "", "event: status", r#"data: {"status":"paused"}"#, ""],
    );
    assert_eq!(frames.len(), 1);
}

#[test]
fn cursor_carries_forward_when_id_missing() {
    let mut parser = SseParser::new(5);
    let frames = feed(&mut parser, &["event: status", r#"data: {"status":"running"}"#, ""]);
    assert_eq!(frames[0].cursor, 5);
}

#[test]
fn aborted_event_maps_to_status() {
    let mut parser = SseParser::new(0);
    let frames = feed(&mut parser, &["event: aborted", ""]);
    assert_eq!(
        frames[0].event,
        RemoteEvent::Status { status: "aborted".into(), reason: None }
    );
}
