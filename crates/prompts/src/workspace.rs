// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-topic prompt directories and the freeze lifecycle.

use cvr_core::handoff::HandoffSpec;
use cvr_core::id::TopicSlug;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors from prompt workspace operations
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("working prompt missing for topic {0}")]
    WorkingMissing(String),
    #[error("topic {0} is frozen; working prompt is immutable")]
    Frozen(String),
    #[error("handoff missing for topic {0}")]
    HandoffMissing(String),
    #[error("handoff serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Version(#[from] cvr_core::handoff::HandoffVersionError),
}

/// Result of freezing a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenHandoff {
    pub handoff_md_path: PathBuf,
    pub handoff_json_path: PathBuf,
    /// sha256 hex digest of `handoff.json` bytes.
    pub digest: String,
    /// True when the topic was already frozen and the existing paths were
    /// returned; the caller must not re-emit a freeze event.
    pub already_frozen: bool,
}

/// Filesystem-backed prompt workspace rooted at `<root>/prompts`.
///
/// Writes within one topic are serialized by a per-topic async lock;
/// cross-topic writes proceed in parallel.
pub struct PromptWorkspace {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PromptWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), locks: Mutex::new(HashMap::new()) }
    }

    pub fn topic_dir(&self, topic: &TopicSlug) -> PathBuf {
        self.root.join(topic.as_str())
    }

    pub fn working_path(&self, topic: &TopicSlug) -> PathBuf {
        self.topic_dir(topic).join("working.md")
    }

    pub fn handoff_md_path(&self, topic: &TopicSlug) -> PathBuf {
        self.topic_dir(topic).join("handoff.md")
    }

    pub fn handoff_json_path(&self, topic: &TopicSlug) -> PathBuf {
        self.topic_dir(topic).join("handoff.json")
    }

    fn topic_lock(&self, topic: &TopicSlug) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(topic.as_str().to_string()).or_default())
    }

    /// Overwrite `working.md` atomically. Fails once the topic is frozen.
    pub async fn update_working(
        &self,
        topic: &TopicSlug,
        content: &str,
    ) -> Result<PathBuf, PromptError> {
        let lock = self.topic_lock(topic);
        let _guard = lock.lock().await;

        if self.is_frozen(topic) {
            return Err(PromptError::Frozen(topic.as_str().to_string()));
        }

        let dir = self.topic_dir(topic);
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.working_path(topic);
        write_atomic(&path, content.as_bytes()).await?;
        Ok(path)
    }

    /// Read the current working prompt.
    pub async fn read_working(&self, topic: &TopicSlug) -> Result<String, PromptError> {
        match tokio::fs::read_to_string(self.working_path(topic)).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PromptError::WorkingMissing(topic.as_str().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Freeze a topic: produce `handoff.md` + `handoff.json` atomically.
    ///
    /// Preconditions: `working.md` exists and the topic is not yet frozen.
    /// Both files land or neither does (two temps, sequential renames; a
    /// partial landing is rolled back). Idempotent: a second freeze returns
    /// the existing paths with `already_frozen` set and writes nothing.
    pub async fn freeze(
        &self,
        topic: &TopicSlug,
        markdown: &str,
        spec: &HandoffSpec,
    ) -> Result<FrozenHandoff, PromptError> {
        let lock = self.topic_lock(topic);
        let _guard = lock.lock().await;

        let md_path = self.handoff_md_path(topic);
        let json_path = self.handoff_json_path(topic);

        if self.is_frozen(topic) {
            let json_bytes = tokio::fs::read(&json_path).await?;
            return Ok(FrozenHandoff {
                handoff_md_path: md_path,
                handoff_json_path: json_path,
                digest: hex_digest(&json_bytes),
                already_frozen: true,
            });
        }

        if !self.working_path(topic).exists() {
            return Err(PromptError::WorkingMissing(topic.as_str().to_string()));
        }

        let json_bytes = serde_json::to_vec_pretty(spec)?;
        let digest = hex_digest(&json_bytes);

        let md_tmp = md_path.with_extension("md.tmp");
        let json_tmp = json_path.with_extension("json.tmp");
        tokio::fs::write(&md_tmp, markdown.as_bytes()).await?;
        tokio::fs::write(&json_tmp, &json_bytes).await?;

        tokio::fs::rename(&md_tmp, &md_path).await?;
        if let Err(e) = tokio::fs::rename(&json_tmp, &json_path).await {
            // Roll back the half that landed so the pair stays atomic.
            let _ = tokio::fs::remove_file(&md_path).await;
            let _ = tokio::fs::remove_file(&json_tmp).await;
            return Err(e.into());
        }

        tracing::info!(topic = %topic, digest = cvr_core::short(&digest, 12), "froze handoff");
        Ok(FrozenHandoff {
            handoff_md_path: md_path,
            handoff_json_path: json_path,
            digest,
            already_frozen: false,
        })
    }

    /// Both handoff files present. The freeze invariant means checking one
    /// would suffice; requiring both guards against manual tampering.
    pub fn is_frozen(&self, topic: &TopicSlug) -> bool {
        self.handoff_md_path(topic).exists() && self.handoff_json_path(topic).exists()
    }

    /// Read and version-check the frozen execution contract.
    pub async fn read_handoff(&self, topic: &TopicSlug) -> Result<HandoffSpec, PromptError> {
        let bytes = match tokio::fs::read(self.handoff_json_path(topic)).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PromptError::HandoffMissing(topic.as_str().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let spec: HandoffSpec = serde_json::from_slice(&bytes)?;
        spec.check_version()?;
        Ok(spec)
    }

    /// Deterministic artifact path: `artifacts/<timestamp>-<slug>.<ext>`,
    /// extension chosen by artifact kind.
    pub fn artifact_path(
        &self,
        topic: &TopicSlug,
        kind: &str,
        slug: &str,
        now_ms: u64,
    ) -> PathBuf {
        let ext = match kind {
            "json" => "json",
            "log" => "log",
            _ => "md",
        };
        let stamp = chrono::DateTime::from_timestamp_millis(now_ms as i64)
            .map(|t| t.format("%Y%m%d-%H%M%S").to_string())
            .unwrap_or_else(|| now_ms.to_string());
        self.topic_dir(topic)
            .join("artifacts")
            .join(format!("{}-{}.{}", stamp, slug, ext))
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Write via temp file + rename so readers never see a torn file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
