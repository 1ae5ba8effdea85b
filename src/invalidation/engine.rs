//! `InvalidationEngine`: rule registry plus event-driven dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::rule::InvalidationRule;
use super::stats::{RuleStatistics, RuleStatisticsSnapshot};
use crate::cache::{CacheManager, KeyBuilder};
use crate::events::{CacheEvent, EventBus};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

#[derive(Clone)]
struct RuleEntry {
    rule: Arc<InvalidationRule>,
    stats: Arc<RuleStatistics>,
}

/// A single entry in `InvalidationStatistics`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleInvalidationStats {
    pub event_type: String,
    pub patterns: Vec<String>,
    #[serde(flatten)]
    pub counters: RuleStatisticsSnapshot,
}

/// Evaluates event-driven invalidation rules against `CacheManager`.
/// Self-subscribes to `EventBus` the first time a rule is registered for a
/// given event type, so downstream publishers never need to know the
/// engine exists.
pub struct InvalidationEngine {
    cache_manager: Arc<CacheManager>,
    event_bus: Arc<EventBus>,
    rules: RwLock<HashMap<String, Vec<RuleEntry>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl InvalidationEngine {
    pub fn new(cache_manager: Arc<CacheManager>, event_bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            cache_manager,
            event_bus,
            rules: RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn register_rule(self: &Arc<Self>, rule: InvalidationRule) {
        let event_type = rule.event_type.clone();
        let entry = RuleEntry {
            rule: Arc::new(rule),
            stats: Arc::new(RuleStatistics::default()),
        };

        let mut is_new_type = false;
        {
            let mut rules = self.rules.write();
            let list = rules.entry(event_type.clone()).or_insert_with(|| {
                is_new_type = true;
                Vec::new()
            });
            list.push(entry);
        }

        if is_new_type {
            let engine = self.clone();
            self.event_bus.subscribe(
                event_type,
                Arc::new(move |event: &CacheEvent| engine.dispatch(event.clone())),
            );
        }
    }

    pub fn rules(&self, event_type: &str) -> Vec<Arc<InvalidationRule>> {
        self.rules
            .read()
            .get(event_type)
            .map(|entries| entries.iter().map(|e| e.rule.clone()).collect())
            .unwrap_or_default()
    }

    pub fn registered_event_types(&self) -> Vec<String> {
        self.rules.read().keys().cloned().collect()
    }

    /// Runs the rule-matching algorithm for `event`. Called both from the
    /// bus subscription and directly by tests.
    fn dispatch(self: &Arc<Self>, event: CacheEvent) {
        let matching = match self.rules.read().get(&event.event_type) {
            Some(entries) => entries.clone(),
            None => return,
        };

        for entry in matching {
            if !entry.rule.condition_matches(&event.data) {
                continue;
            }
            let rendered: Vec<String> = entry
                .rule
                .patterns
                .iter()
                .map(|p| KeyBuilder::render_pattern(p, &event.data))
                .collect();

            let cache_manager = self.cache_manager.clone();
            let stats = entry.stats.clone();
            let invoke = move || {
                let deleted: usize = rendered.iter().map(|p| cache_manager.invalidate(p)).sum();
                stats.record(deleted, now_millis());
            };

            match entry.rule.delay {
                Some(delay) => {
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        invoke();
                    });
                    self.pending.lock().push(handle);
                }
                None if entry.rule.is_async => {
                    let handle = tokio::spawn(async move { invoke() });
                    self.pending.lock().push(handle);
                }
                None => invoke(),
            }
        }
    }

    /// Bypasses rule matching entirely; invokes `CacheManager::invalidate`
    /// directly for each pattern and returns the summed count.
    pub fn manual_invalidate(&self, patterns: &[String]) -> usize {
        patterns.iter().map(|p| self.cache_manager.invalidate(p)).sum()
    }

    pub fn statistics(&self) -> Vec<RuleInvalidationStats> {
        self.rules
            .read()
            .iter()
            .flat_map(|(event_type, entries)| {
                entries.iter().map(move |e| RuleInvalidationStats {
                    event_type: event_type.clone(),
                    patterns: e.rule.patterns.clone(),
                    counters: e.stats.snapshot(),
                })
            })
            .collect()
    }

    /// Aborts any outstanding delayed/async invalidation tasks. The cache is
    /// fully in-memory and begins empty on every start, so dropping
    /// in-flight invalidations on shutdown is the simplest safe behavior.
    pub fn shutdown(&self) {
        for handle in self.pending.lock().drain(..) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn dispatch_for_test(self: &Arc<Self>, event: CacheEvent) {
        self.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStoreConfig;
    use crate::common::Value;
    use std::collections::HashMap as StdHashMap;
    use std::time::Duration;

    fn setup() -> (Arc<CacheManager>, Arc<EventBus>, Arc<InvalidationEngine>) {
        let cm = CacheManager::new(CacheStoreConfig {
            max_entries: 100,
            default_ttl_seconds: 60,
        });
        let bus = Arc::new(EventBus::with_worker_count(2));
        let engine = InvalidationEngine::new(cm.clone(), bus.clone());
        (cm, bus, engine)
    }

    #[tokio::test]
    async fn sync_rule_invalidates_inline() {
        let (cm, _bus, engine) = setup();
        let store = cm.get_or_create_default("trades");
        store.put("trades:AAA:1", Value::Integer(1), None);

        engine.register_rule(
            InvalidationRule::new("trade.updated", vec!["trades:{symbol}*".into()], None, false, None).unwrap(),
        );

        let mut data = StdHashMap::new();
        data.insert("symbol".to_string(), "AAA".to_string());
        engine.dispatch_for_test(CacheEvent::new("trade.updated", "test", data));

        assert_eq!(store.size(), 0);
        assert_eq!(engine.statistics()[0].counters.invocations, 1);
        cm.shutdown();
    }

    #[tokio::test]
    async fn condition_gates_rule_firing() {
        let (cm, _bus, engine) = setup();
        let store = cm.get_or_create_default("trades");
        store.put("trades:AAA:1", Value::Integer(1), None);

        engine.register_rule(
            InvalidationRule::new(
                "trade.updated",
                vec!["trades:{symbol}*".into()],
                Some("side=BUY".into()),
                false,
                None,
            )
            .unwrap(),
        );

        let mut data = StdHashMap::new();
        data.insert("symbol".to_string(), "AAA".to_string());
        data.insert("side".to_string(), "SELL".to_string());
        engine.dispatch_for_test(CacheEvent::new("trade.updated", "test", data));
        assert_eq!(store.size(), 1, "condition false, rule must not fire");
        cm.shutdown();
    }

    #[tokio::test]
    async fn delayed_rule_fires_after_delay_not_before() {
        let (cm, _bus, engine) = setup();
        let store = cm.get_or_create_default("trades");
        store.put("trades:AAA:1", Value::Integer(1), None);

        engine.register_rule(
            InvalidationRule::new(
                "trade.updated",
                vec!["trades:{symbol}*".into()],
                None,
                true,
                Some(Duration::from_millis(50)),
            )
            .unwrap(),
        );

        let mut data = StdHashMap::new();
        data.insert("symbol".to_string(), "AAA".to_string());
        engine.dispatch_for_test(CacheEvent::new("trade.updated", "test", data));

        assert_eq!(store.size(), 1, "must not invalidate before the delay elapses");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.size(), 0);
        cm.shutdown();
    }

    #[tokio::test]
    async fn manual_invalidate_bypasses_rule_matching() {
        let (cm, _bus, engine) = setup();
        let store = cm.get_or_create_default("trades");
        store.put("trades:AAA:1", Value::Integer(1), None);
        let deleted = engine.manual_invalidate(&["trades:AAA*".to_string()]);
        assert_eq!(deleted, 1);
        cm.shutdown();
    }
}
