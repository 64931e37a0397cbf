// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment knobs and protocol constants.

use std::path::PathBuf;
use std::time::Duration;

/// Protocol version for the Hello handshake.
pub const PROTOCOL_VERSION: &str = "1";

/// Workspace root (state/, inbox/, prompts/, cache/ live under it).
///
/// `CVR_ROOT` overrides; default `~/.local/state/conversator` (or
/// `$XDG_STATE_HOME/conversator`).
pub fn workspace_root() -> Option<PathBuf> {
    if let Ok(root) = std::env::var("CVR_ROOT") {
        return Some(PathBuf::from(root));
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("conversator"))
}

/// Path to the daemon configuration document (`CVR_CONFIG` overrides).
pub fn config_path(root: &std::path::Path) -> PathBuf {
    std::env::var("CVR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| root.join("config.toml"))
}

/// IPC read/write timeout (`CVR_IPC_TIMEOUT_MS` overrides).
pub fn ipc_timeout() -> Duration {
    let ms = std::env::var("CVR_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10_000);
    Duration::from_millis(ms)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
