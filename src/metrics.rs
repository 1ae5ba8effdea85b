//! `MetricsCollector`: per-query and aggregate hit/miss/latency counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// One completed query execution, fed into `MetricsCollector::record`.
#[derive(Debug, Clone)]
pub struct MetricsSample {
    pub query_name: String,
    pub cache_name: Option<String>,
    pub cache_key: Option<String>,
    pub hit: bool,
    pub latency_millis: u64,
    pub at_millis: i64,
}

impl MetricsSample {
    pub fn now(query_name: impl Into<String>, hit: bool, latency_millis: u64) -> Self {
        Self {
            query_name: query_name.into(),
            cache_name: None,
            cache_key: None,
            hit,
            latency_millis,
            at_millis: now_millis(),
        }
    }
}

#[derive(Default)]
struct PerQueryCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    cache_latency_sum: AtomicU64,
    db_latency_sum: AtomicU64,
    first_access_millis: AtomicI64,
    last_access_millis: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerQuerySnapshot {
    pub hits: u64,
    pub misses: u64,
    pub cache_latency_sum: u64,
    pub db_latency_sum: u64,
    pub first_access_millis: i64,
    pub last_access_millis: i64,
}

/// Aggregate and per-query hit/miss/latency accounting. All updates are
/// atomic increments; `reset()` zeroes every counter.
pub struct MetricsCollector {
    total_requests: AtomicU64,
    total_hits: AtomicU64,
    total_misses: AtomicU64,
    cache_latency_sum: AtomicU64,
    db_latency_sum: AtomicU64,
    per_query: DashMap<String, Arc<PerQueryCounters>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub average_cache_response_time_ms: f64,
    pub average_database_response_time_ms: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_hits: AtomicU64::new(0),
            total_misses: AtomicU64::new(0),
            cache_latency_sum: AtomicU64::new(0),
            db_latency_sum: AtomicU64::new(0),
            per_query: DashMap::new(),
        }
    }

    pub fn record(&self, sample: &MetricsSample) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let counters = self
            .per_query
            .entry(sample.query_name.clone())
            .or_insert_with(|| Arc::new(PerQueryCounters::default()))
            .clone();

        if counters.first_access_millis.load(Ordering::Relaxed) == 0 {
            counters.first_access_millis.store(sample.at_millis, Ordering::Relaxed);
        }
        counters.last_access_millis.store(sample.at_millis, Ordering::Relaxed);

        if sample.hit {
            self.total_hits.fetch_add(1, Ordering::Relaxed);
            self.cache_latency_sum.fetch_add(sample.latency_millis, Ordering::Relaxed);
            counters.hits.fetch_add(1, Ordering::Relaxed);
            counters.cache_latency_sum.fetch_add(sample.latency_millis, Ordering::Relaxed);
        } else {
            self.total_misses.fetch_add(1, Ordering::Relaxed);
            self.db_latency_sum.fetch_add(sample.latency_millis, Ordering::Relaxed);
            counters.misses.fetch_add(1, Ordering::Relaxed);
            counters.db_latency_sum.fetch_add(sample.latency_millis, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_hits = self.total_hits.load(Ordering::Relaxed);
        let total_misses = self.total_misses.load(Ordering::Relaxed);
        let cache_latency_sum = self.cache_latency_sum.load(Ordering::Relaxed);
        let db_latency_sum = self.db_latency_sum.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests,
            total_hits,
            total_misses,
            hit_rate: if total_requests == 0 {
                0.0
            } else {
                total_hits as f64 / total_requests as f64
            },
            average_cache_response_time_ms: if total_hits == 0 {
                0.0
            } else {
                cache_latency_sum as f64 / total_hits as f64
            },
            average_database_response_time_ms: if total_misses == 0 {
                0.0
            } else {
                db_latency_sum as f64 / total_misses as f64
            },
        }
    }

    pub fn per_query_snapshot(&self, query_name: &str) -> Option<PerQuerySnapshot> {
        self.per_query.get(query_name).map(|c| PerQuerySnapshot {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            cache_latency_sum: c.cache_latency_sum.load(Ordering::Relaxed),
            db_latency_sum: c.db_latency_sum.load(Ordering::Relaxed),
            first_access_millis: c.first_access_millis.load(Ordering::Relaxed),
            last_access_millis: c.last_access_millis.load(Ordering::Relaxed),
        })
    }

    pub fn query_names(&self) -> Vec<String> {
        self.per_query.iter().map(|e| e.key().clone()).collect()
    }

    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.total_hits.store(0, Ordering::Relaxed);
        self.total_misses.store(0, Ordering::Relaxed);
        self.cache_latency_sum.store(0, Ordering::Relaxed);
        self.db_latency_sum.store(0, Ordering::Relaxed);
        self.per_query.clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
