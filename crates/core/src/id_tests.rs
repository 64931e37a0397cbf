// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn generated_ids_carry_prefix_and_fit_inline() {
    let id = TaskId::new();
    assert!(id.as_str().starts_with("tsk-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn ids_roundtrip_through_serde() {
    let id = InboxId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: InboxId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}

#[test]
fn id_equality_with_str() {
    let id = TaskId::from_string("tsk-abc");
    assert_eq!(id, "tsk-abc");
    assert_eq!(id.as_str(), "tsk-abc");
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
}

#[test]
fn oversized_id_rejected_on_deserialize() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    let result: Result<TaskId, _> = serde_json::from_str(&long);
    assert!(result.is_err());
}

mod slugs {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        simple = { "JWT refresh fix", "jwt-refresh-fix" },
        punctuation = { "fix: auth / refresh!!", "fix-auth-refresh" },
        unicode_dropped = { "café menu", "caf-menu" },
        empty = { "", "topic" },
        symbols_only = { "!!!", "topic" },
    )]
    fn from_title(title: &str, expected: &str) {
        assert_eq!(TopicSlug::from_title(title).as_str(), expected);
    }

    #[test]
    fn long_titles_truncate() {
        let slug = TopicSlug::from_title(&"word ".repeat(30));
        assert!(slug.as_str().len() <= 48);
        assert!(!slug.as_str().ends_with('-'));
    }
}
