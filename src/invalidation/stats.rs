//! Per-rule invalidation counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RuleStatistics {
    pub invocations: AtomicU64,
    pub entries_invalidated: AtomicU64,
    pub last_fired_at_millis: AtomicI64,
}

impl RuleStatistics {
    pub fn record(&self, deleted: usize, now_millis: i64) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.entries_invalidated.fetch_add(deleted as u64, Ordering::Relaxed);
        self.last_fired_at_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RuleStatisticsSnapshot {
        RuleStatisticsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            entries_invalidated: self.entries_invalidated.load(Ordering::Relaxed),
            last_fired_at_millis: self.last_fired_at_millis.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RuleStatisticsSnapshot {
    pub invocations: u64,
    pub entries_invalidated: u64,
    pub last_fired_at_millis: i64,
}
