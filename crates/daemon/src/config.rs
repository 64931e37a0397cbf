// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration document.
//!
//! Loaded once at startup. Declares the builder registry and the listen
//! addresses; everything else is derived from the workspace root.

use cvr_adapters::BuilderConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate builder kind: {0}")]
    DuplicateKind(String),
}

/// The startup configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// HTTP fan-out listen address. None disables the HTTP surface.
    #[serde(default)]
    pub http_addr: Option<String>,

    /// Coalescing window for info/success delivery hints, milliseconds.
    #[serde(default = "default_coalesce_ms")]
    pub coalesce_window_ms: u64,

    /// Declared builders (`[[builder]]` tables).
    #[serde(default, rename = "builder")]
    pub builders: Vec<BuilderConfig>,
}

fn default_coalesce_ms() -> u64 {
    5_000
}

impl DaemonConfig {
    /// Load the document, tolerating a missing file (empty registry).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config document; starting with empty builder registry");
                return Ok(Self { coalesce_window_ms: default_coalesce_ms(), ..Self::default() });
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self = toml::from_str(&text)?;
        let mut seen = std::collections::HashSet::new();
        for builder in &config.builders {
            if !seen.insert(builder.kind.clone()) {
                return Err(ConfigError::DuplicateKind(builder.kind.clone()));
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
