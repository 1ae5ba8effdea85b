//! `CacheStore`: a single named, bounded, TTL-aware key→entry map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use super::entry::CacheEntry;
use super::key::KeyBuilder;
use super::statistics::CacheStoreStatistics;
use crate::common::Value;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// Configuration a `CacheStore` is created with; overridden per-query by
/// `CacheSpec.ttlSeconds` at `put` time.
#[derive(Debug, Clone, Copy)]
pub struct CacheStoreConfig {
    pub max_entries: usize,
    pub default_ttl_seconds: u64,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            default_ttl_seconds: 300,
        }
    }
}

/// A single named cache. Counters are atomics so statistics readers never
/// block writers; structural mutation (insert, evict, invalidate) holds a
/// short-lived exclusive lock over the entry map.
pub struct CacheStore {
    name: String,
    config: CacheStoreConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    insertion_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    puts: AtomicU64,
}

impl CacheStore {
    pub fn new(name: impl Into<String>, config: CacheStoreConfig) -> Self {
        Self {
            name: name.into(),
            config,
            entries: RwLock::new(HashMap::new()),
            insertion_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            puts: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value on a live hit, bumping access tracking in place.
    /// A present-but-expired entry is evicted in-line and counted as a miss
    /// plus an expiration, never observed by the caller.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = now_millis();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                entry.mark_accessed(now);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or overwrites `key`. `ttl_seconds` of `None` falls back to
    /// the store's `default_ttl_seconds`. If the map grows past
    /// `max_entries`, evicts the least-recently-accessed entry (ties broken
    /// by oldest insertion).
    pub fn put(&self, key: impl Into<String>, value: Value, ttl_seconds: Option<u64>) {
        let now = now_millis();
        let ttl = ttl_seconds.unwrap_or(self.config.default_ttl_seconds);
        let seq = self.insertion_seq.fetch_add(1, Ordering::Relaxed);
        let entry = CacheEntry::new(value, now, ttl, seq);

        let mut entries = self.entries.write();
        entries.insert(key.into(), entry);
        self.puts.fetch_add(1, Ordering::Relaxed);

        if entries.len() > self.config.max_entries {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, e)| (e.last_access_millis, e.insertion_seq))
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Deletes every resident key matching `pattern` (see `KeyBuilder::matches`).
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write();
        let victims: Vec<String> = entries
            .keys()
            .filter(|k| KeyBuilder::matches(k, pattern))
            .cloned()
            .collect();
        for key in &victims {
            entries.remove(key);
        }
        victims.len()
    }

    /// Removes all resident entries whose TTL has lapsed. Used by the
    /// manager's background scavenger; opportunistic, never required for
    /// correctness since `get` already enforces TTL in-line.
    pub fn sweep_expired(&self) -> usize {
        let now = now_millis();
        let mut entries = self.entries.write();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        self.expirations.fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn size(&self) -> usize {
        self.entries.read().len()
    }

    pub fn statistics(&self) -> CacheStoreStatistics {
        CacheStoreStatistics {
            name: self.name.clone(),
            size: self.size() as u64,
            max_entries: self.config.max_entries as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
        }
    }
}
