//! `CacheManager`: registry of named `CacheStore`s plus a background scavenger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::statistics::CacheStoreStatistics;
use super::store::{CacheStore, CacheStoreConfig};

const DEFAULT_CLEANUP_PERIOD_SECONDS: u64 = 60;

/// Owns every `CacheStore` for the lifetime of the process. A store is
/// created lazily on first reference to its name and lives until
/// `shutdown()`.
pub struct CacheManager {
    stores: DashMap<String, Arc<CacheStore>>,
    default_config: CacheStoreConfig,
    scavenger: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    pub fn new(default_config: CacheStoreConfig) -> Arc<Self> {
        let manager = Arc::new(Self {
            stores: DashMap::new(),
            default_config,
            scavenger: std::sync::Mutex::new(None),
        });
        manager.clone().spawn_scavenger(Duration::from_secs(DEFAULT_CLEANUP_PERIOD_SECONDS));
        manager
    }

    fn spawn_scavenger(self: Arc<Self>, period: Duration) {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                for entry in self.stores.iter() {
                    let swept = entry.value().sweep_expired();
                    if swept > 0 {
                        tracing::debug!(cache = %entry.key(), swept, "scavenger removed expired entries");
                    }
                }
            }
        });
        *self.scavenger.lock().expect("scavenger mutex poisoned") = Some(handle);
    }

    /// Returns the store for `cache_name`, creating it with `config` the
    /// first time it's referenced. `config` is ignored on subsequent calls.
    pub fn get_or_create(&self, cache_name: &str, config: CacheStoreConfig) -> Arc<CacheStore> {
        self.stores
            .entry(cache_name.to_string())
            .or_insert_with(|| Arc::new(CacheStore::new(cache_name, config)))
            .clone()
    }

    pub fn get_or_create_default(&self, cache_name: &str) -> Arc<CacheStore> {
        self.get_or_create(cache_name, self.default_config)
    }

    pub fn get(&self, cache_name: &str) -> Option<Arc<CacheStore>> {
        self.stores.get(cache_name).map(|s| s.clone())
    }

    /// Broadcasts `pattern` to the store whose name equals the segment of
    /// `pattern` preceding its first `:`. Returns the summed deletion count.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let target = pattern.split(':').next().unwrap_or(pattern);
        self.stores
            .iter()
            .filter(|entry| entry.key() == target)
            .map(|entry| entry.value().invalidate(pattern))
            .sum()
    }

    pub fn statistics(&self) -> HashMap<String, CacheStoreStatistics> {
        self.stores
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().statistics()))
            .collect()
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.scavenger.lock().expect("scavenger mutex poisoned").take() {
            handle.abort();
        }
    }
}
