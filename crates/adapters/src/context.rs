// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pointer-first context lookup contract.
//!
//! The retrieval store is an external collaborator; the core only speaks
//! this interface and stores the returned pointers. The default
//! implementation returns nothing, which keeps the core's memory footprint
//! bounded by derived state alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One retrieval hit: a pointer plus a short summary, never full content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHit {
    pub path: PathBuf,
    pub summary: String,
    pub score: f64,
}

/// Contract for the external retrieval store.
#[async_trait]
pub trait ContextLookup: Send + Sync + 'static {
    async fn lookup_context(&self, query: &str) -> Vec<ContextHit>;
}

/// No retrieval store configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopContextLookup;

#[async_trait]
impl ContextLookup for NoopContextLookup {
    async fn lookup_context(&self, _query: &str) -> Vec<ContextHit> {
        Vec::new()
    }
}
