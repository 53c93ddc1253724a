//! Content-addressed evolution cache
//!
//! Maps the SHA-256 digest of a function body to the accepted replacement
//! text. A value equal to the original body records "do not rewrite this
//! again". Entries live for the whole run and are never evicted; identical
//! bodies in different files resolve to the same stored output.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hex SHA-256 digest of some text
pub fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Thread-safe, run-scoped evolution cache
#[derive(Clone, Default)]
pub struct EvolutionCache {
    entries: Arc<DashMap<String, String>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl EvolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key, counting the hit or miss
    pub fn lookup(&self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, value: String) {
        self.entries.insert(key, value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries and counters, for reuse across runs
    pub fn reset(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            format!("{:.1}%", hits as f64 / total as f64 * 100.0)
        } else {
            "N/A".to_string()
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
            cached_entries: self.entries.len(),
        }
    }
}

/// Cache performance snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: String,
    pub cached_entries: usize,
}
