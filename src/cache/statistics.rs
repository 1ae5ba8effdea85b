//! Point-in-time counter snapshots for a single `CacheStore`.

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStoreStatistics {
    pub name: String,
    pub size: u64,
    pub max_entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub puts: u64,
}

impl CacheStoreStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
