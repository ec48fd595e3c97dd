//! TTL cache for engagement decisions.
//!
//! Purely an optimization over the LLM-backed analysis: absence never
//! changes correctness, only cost and latency. Entries are idempotent
//! snapshots of the same underlying decision, so same-key races resolve
//! last-write-wins.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a cached decision stays valid.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// A cached engagement decision.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub decision: bool,
    pub reason: String,
    cached_at: Instant,
}

/// Keyed cache of recent engagement decisions.
pub struct EngagementCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl EngagementCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a decision if one is cached and still fresh.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .cloned()
    }

    /// Store a decision, replacing any previous entry for the key.
    pub fn insert(&self, key: String, decision: bool, reason: String) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                decision,
                reason,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop entries past their TTL. Called opportunistically; correctness
    /// does not depend on it.
    pub fn purge_expired(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EngagementCache {
    fn default() -> Self {
        Self::new()
    }
}
