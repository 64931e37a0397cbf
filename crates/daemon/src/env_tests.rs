// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn root_override_wins() {
    std::env::set_var("CVR_ROOT", "/tmp/cvr-test-root");
    let root = workspace_root().unwrap();
    assert_eq!(root, PathBuf::from("/tmp/cvr-test-root"));
    std::env::remove_var("CVR_ROOT");
}

#[test]
#[serial]
fn config_path_prefers_env() {
    std::env::set_var("CVR_CONFIG", "/tmp/custom-config.toml");
    let path = config_path(std::path::Path::new("/root-ignored"));
    assert_eq!(path, PathBuf::from("/tmp/custom-config.toml"));
    std::env::remove_var("CVR_CONFIG");

    let path = config_path(std::path::Path::new("/some/root"));
    assert_eq!(path, PathBuf::from("/some/root/config.toml"));
}

#[test]
#[serial]
fn ipc_timeout_parses_and_defaults() {
    std::env::set_var("CVR_IPC_TIMEOUT_MS", "250");
    assert_eq!(ipc_timeout(), Duration::from_millis(250));
    std::env::set_var("CVR_IPC_TIMEOUT_MS", "not-a-number");
    assert_eq!(ipc_timeout(), Duration::from_millis(10_000));
    std::env::remove_var("CVR_IPC_TIMEOUT_MS");
    assert_eq!(ipc_timeout(), Duration::from_millis(10_000));
}
