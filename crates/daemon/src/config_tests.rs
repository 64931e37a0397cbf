// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn missing_config_yields_empty_registry() {
    let dir = tempdir().unwrap();
    let config = DaemonConfig::load(&dir.path().join("config.toml")).unwrap();
    assert!(config.builders.is_empty());
    assert!(config.http_addr.is_none());
    assert_eq!(config.coalesce_window_ms, 5_000);
}

#[test]
fn parses_builders_and_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
http_addr = "127.0.0.1:8080"
coalesce_window_ms = 2500

[[builder]]
name = "local-agent"
kind = "default"
endpoint = "127.0.0.1:9900"
default_model = "large"

[builder.timeouts]
stream_idle_s = 300

[[builder]]
name = "fast-agent"
kind = "fast"
endpoint = "127.0.0.1:9901"
"#,
    )
    .unwrap();

    let config = DaemonConfig::load(&path).unwrap();
    assert_eq!(config.http_addr.as_deref(), Some("127.0.0.1:8080"));
    assert_eq!(config.coalesce_window_ms, 2500);
    assert_eq!(config.builders.len(), 2);
    assert_eq!(config.builders[0].timeouts.stream_idle_s, 300);
    assert_eq!(config.builders[1].kind, "fast");
}

#[test]
fn duplicate_kinds_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[builder]]
name = "a"
kind = "default"
endpoint = "127.0.0.1:1"

[[builder]]
name = "b"
kind = "default"
endpoint = "127.0.0.1:2"
"#,
    )
    .unwrap();

    assert!(matches!(
        DaemonConfig::load(&path),
        Err(ConfigError::DuplicateKind(k)) if k == "default"
    ));
}

#[test]
fn malformed_document_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "http_addr = [not toml").unwrap();
    assert!(matches!(DaemonConfig::load(&path), Err(ConfigError::Parse(_))));
}
