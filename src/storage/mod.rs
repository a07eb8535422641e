//! Snapshot persistence for the dedup cache.
//!
//! The cache survives process restarts through a single JSON snapshot that is
//! loaded at startup and rewritten whole at the end of each run:
//!
//! ```text
//! {
//!   "prime_gaming": ["<hash>", ...],
//!   "xbox_gamepass": ["<hash>", ...],
//!   "last_update": { "prime_gaming": "2026-08-07T10:00:00Z", ... }
//! }
//! ```
//!
//! Loading is tolerant: a missing file yields no snapshot, absent sources
//! default to empty sequences, and a corrupt file is reported as an error the
//! cache downgrades to a warning plus empty state.

pub mod local;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// Re-export for convenience
pub use local::JsonFileStore;

/// Durable form of the dedup cache.
///
/// Source keys sit at the top level of the JSON object, next to the
/// `last_update` map, so the file stays a flat, hand-inspectable record.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheSnapshot {
    /// Last successful run per source, ISO-8601
    #[serde(default)]
    pub last_update: HashMap<String, DateTime<Utc>>,

    /// Ordered hash window per source
    #[serde(flatten)]
    pub sources: HashMap<String, Vec<String>>,
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot, `None` when no snapshot exists yet.
    async fn load(&self) -> Result<Option<CacheSnapshot>>;

    /// Persist the snapshot as a complete overwrite.
    async fn save(&self, snapshot: &CacheSnapshot) -> Result<()>;
}
