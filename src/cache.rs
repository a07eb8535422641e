// src/cache.rs

//! Content-addressed dedup cache.
//!
//! Remembers, per source, a bounded window of content hashes for offers that
//! were already reported, plus the time of each source's last successful run.
//! Hashing and duplicate decisions live here and only here; extractors hand
//! over raw candidates and never consult the cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::storage::{CacheSnapshot, SnapshotStore};

/// Persistent record of previously-seen offers per source.
pub struct DedupCache {
    store: Arc<dyn SnapshotStore>,
    retention: usize,
    sequences: HashMap<String, VecDeque<String>>,
    last_update: HashMap<String, DateTime<Utc>>,
}

impl DedupCache {
    /// Load the cache from the snapshot store.
    ///
    /// A missing or unreadable snapshot degrades to an empty cache with a
    /// logged warning; absent sources default to empty sequences. Snapshot
    /// problems are never fatal.
    pub async fn load(store: Arc<dyn SnapshotStore>, retention: usize) -> Self {
        let snapshot = match store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                log::info!("No cache snapshot found, starting empty");
                CacheSnapshot::default()
            }
            Err(e) => {
                log::warn!("Cache snapshot load failed: {}. Starting empty.", e);
                CacheSnapshot::default()
            }
        };

        let mut cache = Self {
            store,
            retention,
            sequences: HashMap::new(),
            last_update: snapshot.last_update,
        };

        for (key, hashes) in snapshot.sources {
            let mut sequence = VecDeque::with_capacity(hashes.len());
            for hash in hashes {
                if !sequence.contains(&hash) {
                    sequence.push_back(hash);
                }
            }
            // A lowered retention bound applies on load: keep the newest.
            while sequence.len() > cache.retention {
                sequence.pop_front();
            }
            cache.sequences.insert(key, sequence);
        }

        cache
    }

    /// Deterministic content hash for an offer title within a source.
    ///
    /// Inputs are hashed exactly as provided; any normalization is the
    /// caller's responsibility.
    pub fn compute_hash(title: &str, source_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"_");
        hasher.update(source_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether the hash was already recorded for the source.
    ///
    /// An unknown source behaves as an empty sequence.
    pub fn is_known(&self, source_key: &str, hash: &str) -> bool {
        self.sequences
            .get(source_key)
            .is_some_and(|seq| seq.iter().any(|h| h == hash))
    }

    /// Record a hash for a source.
    ///
    /// Idempotent: a hash already present is left untouched. When the window
    /// exceeds the retention bound, the oldest entries are evicted first.
    pub fn record(&mut self, source_key: &str, hash: &str) {
        let sequence = self.sequences.entry(source_key.to_string()).or_default();
        if sequence.iter().any(|h| h == hash) {
            return;
        }

        sequence.push_back(hash.to_string());
        while sequence.len() > self.retention {
            sequence.pop_front();
        }
    }

    /// Record the time of a source's last successful run.
    pub fn mark_run_completed(&mut self, source_key: &str, timestamp: DateTime<Utc>) {
        self.last_update.insert(source_key.to_string(), timestamp);
    }

    /// Last successful run of a source, if any.
    pub fn last_run(&self, source_key: &str) -> Option<DateTime<Utc>> {
        self.last_update.get(source_key).copied()
    }

    /// Number of remembered hashes for a source.
    pub fn len(&self, source_key: &str) -> usize {
        self.sequences.get(source_key).map_or(0, VecDeque::len)
    }

    /// Current state as a durable snapshot.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            last_update: self.last_update.clone(),
            sources: self
                .sequences
                .iter()
                .map(|(key, seq)| (key.clone(), seq.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Write the whole cache to the snapshot store.
    pub async fn persist(&self) -> Result<()> {
        self.store.save(&self.snapshot()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileStore;
    use tempfile::TempDir;

    async fn empty_cache(tmp: &TempDir, retention: usize) -> DedupCache {
        let store = Arc::new(JsonFileStore::new(tmp.path().join("cache.json")));
        DedupCache::load(store, retention).await
    }

    #[test]
    fn test_compute_hash_is_deterministic() {
        let a = DedupCache::compute_hash("Game X", "prime_gaming");
        let b = DedupCache::compute_hash("Game X", "prime_gaming");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_compute_hash_separates_inputs() {
        assert_ne!(
            DedupCache::compute_hash("Game X", "prime_gaming"),
            DedupCache::compute_hash("Game X", "ps_plus")
        );
        assert_ne!(
            DedupCache::compute_hash("Game X", "prime_gaming"),
            DedupCache::compute_hash("Game Y", "prime_gaming")
        );
        // Case and whitespace are significant as provided.
        assert_ne!(
            DedupCache::compute_hash("Game X", "a"),
            DedupCache::compute_hash("game x", "a")
        );
    }

    #[tokio::test]
    async fn test_record_and_is_known() {
        let tmp = TempDir::new().unwrap();
        let mut cache = empty_cache(&tmp, 100).await;

        let h1 = DedupCache::compute_hash("Game X", "a");
        let h2 = DedupCache::compute_hash("Game Y", "a");

        assert!(!cache.is_known("a", &h1));
        cache.record("a", &h1);
        cache.record("a", &h2);

        assert!(cache.is_known("a", &h1));
        assert!(cache.is_known("a", &h2));
        assert!(!cache.is_known("a", "unrecorded"));
        // Unknown source behaves as an empty sequence.
        assert!(!cache.is_known("b", &h1));
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut cache = empty_cache(&tmp, 100).await;

        cache.record("a", "h1");
        cache.record("a", "h1");

        assert_eq!(cache.len("a"), 1);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let mut cache = empty_cache(&tmp, 3).await;

        for hash in ["h1", "h2", "h3", "h4"] {
            cache.record("a", hash);
        }

        assert_eq!(cache.len("a"), 3);
        assert!(!cache.is_known("a", "h1"));
        assert!(cache.is_known("a", "h2"));
        assert!(cache.is_known("a", "h3"));
        assert!(cache.is_known("a", "h4"));
    }

    #[tokio::test]
    async fn test_persist_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(tmp.path().join("cache.json")));

        let mut cache = DedupCache::load(Arc::clone(&store), 100).await;
        cache.record("a", "h1");
        cache.record("a", "h2");
        cache.record("b", "h3");
        let ts = Utc::now();
        cache.mark_run_completed("a", ts);
        cache.persist().await.unwrap();

        let reloaded = DedupCache::load(store, 100).await;
        assert!(reloaded.is_known("a", "h1"));
        assert!(reloaded.is_known("a", "h2"));
        assert!(reloaded.is_known("b", "h3"));
        assert!(!reloaded.is_known("b", "h1"));
        assert_eq!(reloaded.last_run("a"), Some(ts));
        assert_eq!(reloaded.last_run("b"), None);
    }

    #[tokio::test]
    async fn test_load_tolerates_corrupt_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        tokio::fs::write(&path, b"{ broken").await.unwrap();

        let cache = DedupCache::load(Arc::new(JsonFileStore::new(path)), 100).await;
        assert_eq!(cache.len("a"), 0);
        assert!(cache.last_run("a").is_none());
    }

    #[tokio::test]
    async fn test_load_applies_retention_bound() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(tmp.path().join("cache.json")));

        let mut cache = DedupCache::load(Arc::clone(&store), 100).await;
        for i in 0..10 {
            cache.record("a", &format!("h{}", i));
        }
        cache.persist().await.unwrap();

        // Reload with a smaller bound: only the newest survive.
        let reloaded = DedupCache::load(store, 4).await;
        assert_eq!(reloaded.len("a"), 4);
        assert!(!reloaded.is_known("a", "h5"));
        assert!(reloaded.is_known("a", "h6"));
        assert!(reloaded.is_known("a", "h9"));
    }
}
