//! End-to-end scenarios wiring the cache, invalidation engine, event bus,
//! and query executor together the way a real caller would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cachegate::cache::{CacheManager, CacheStoreConfig};
use cachegate::common::Value;
use cachegate::config::{CacheSpec, InvalidationRuleSpec, QueryDescriptor};
use cachegate::connection::InMemoryConnectionProvider;
use cachegate::events::{CacheEvent, EventBus};
use cachegate::invalidation::InvalidationEngine;
use cachegate::metrics::MetricsCollector;
use cachegate::query::QueryExecutor;

fn descriptor(ttl_seconds: u64) -> QueryDescriptor {
    QueryDescriptor {
        name: "trades".into(),
        database_name: "trades_db".into(),
        sql_text: "SELECT * FROM t WHERE s=?".into(),
        parameter_names: vec!["s".into()],
        cache: CacheSpec {
            enabled: true,
            cache_name: Some("trades".into()),
            ttl_seconds: Some(ttl_seconds),
            key_pattern_template: Some("trades:{s}".into()),
            invalidate_on: vec![],
            invalidation_rules: vec![],
        },
    }
}

fn params(symbol: &str) -> HashMap<String, Value> {
    let mut p = HashMap::new();
    p.insert("s".to_string(), Value::Text(symbol.to_string()));
    p
}

struct Harness {
    executor: QueryExecutor,
    cache_manager: Arc<CacheManager>,
    event_bus: Arc<EventBus>,
    engine: Arc<InvalidationEngine>,
    metrics: Arc<MetricsCollector>,
    provider: Arc<InMemoryConnectionProvider>,
}

fn harness() -> Harness {
    let provider = Arc::new(InMemoryConnectionProvider::new());
    provider.seed(
        "trades_db",
        "SELECT * FROM t WHERE s=?",
        vec![vec![Value::Text("AAA".into()), Value::Integer(1)]],
    );
    let cache_manager = CacheManager::new(CacheStoreConfig {
        max_entries: 10,
        default_ttl_seconds: 60,
    });
    let event_bus = Arc::new(EventBus::new());
    let engine = InvalidationEngine::new(cache_manager.clone(), event_bus.clone());
    let metrics = Arc::new(MetricsCollector::new());
    let executor = QueryExecutor::new(cache_manager.clone(), provider.clone(), metrics.clone());
    Harness {
        executor,
        cache_manager,
        event_bus,
        engine,
        metrics,
        provider,
    }
}

#[tokio::test]
async fn scenario_1_cold_read_then_cache_hit() {
    let h = harness();
    let descriptor = descriptor(60);

    let first = h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();
    assert_eq!(first, vec![vec![Value::Text("AAA".into()), Value::Integer(1)]]);

    let store = h.cache_manager.get("trades").unwrap();
    assert!(store.get("trades:AAA").is_some());

    let second = h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn scenario_2_ttl_expiry_repopulates() {
    let h = harness();
    let descriptor = descriptor(1);

    h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();
    h.provider.seed(
        "trades_db",
        "SELECT * FROM t WHERE s=?",
        vec![vec![Value::Text("AAA".into()), Value::Integer(2)]],
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let rows = h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();
    assert_eq!(rows, vec![vec![Value::Text("AAA".into()), Value::Integer(2)]]);
}

#[tokio::test]
async fn scenario_3_event_invalidation_targets_matching_key_only() {
    let h = harness();
    let descriptor = descriptor(60);

    h.provider.seed(
        "trades_db",
        "SELECT * FROM t WHERE s=?",
        vec![vec![Value::Text("BBB".into()), Value::Integer(9)]],
    );
    h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();

    let mut bbb_params = HashMap::new();
    bbb_params.insert("s".to_string(), Value::Text("BBB".to_string()));
    h.executor.execute(&descriptor, bbb_params, None).await.unwrap();

    let rule = InvalidationRuleSpec {
        event_type: "trade.created".into(),
        patterns: vec!["trades:{s}*".into()],
        condition: None,
        r#async: false,
        delay_seconds: None,
    }
    .into_rule()
    .unwrap();
    h.engine.register_rule(rule);

    let mut data = HashMap::new();
    data.insert("s".to_string(), "AAA".to_string());
    h.event_bus
        .publish_sync(&CacheEvent::new("trade.created", "test", data));

    let store = h.cache_manager.get("trades").unwrap();
    assert!(store.get("trades:AAA").is_none());
    assert!(store.get("trades:BBB").is_some());
}

#[tokio::test]
async fn scenario_4_condition_gates_the_rule() {
    let h = harness();
    let descriptor = descriptor(60);
    h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();

    let rule = InvalidationRuleSpec {
        event_type: "trade.created".into(),
        patterns: vec!["trades:{s}*".into()],
        condition: Some("region=EU".into()),
        r#async: false,
        delay_seconds: None,
    }
    .into_rule()
    .unwrap();
    h.engine.register_rule(rule);

    let mut us_data = HashMap::new();
    us_data.insert("s".to_string(), "AAA".to_string());
    us_data.insert("region".to_string(), "US".to_string());
    h.event_bus
        .publish_sync(&CacheEvent::new("trade.created", "test", us_data));

    let store = h.cache_manager.get("trades").unwrap();
    assert!(store.get("trades:AAA").is_some(), "non-matching region must not invalidate");

    let mut eu_data = HashMap::new();
    eu_data.insert("s".to_string(), "AAA".to_string());
    eu_data.insert("region".to_string(), "EU".to_string());
    h.event_bus
        .publish_sync(&CacheEvent::new("trade.created", "test", eu_data));

    assert!(store.get("trades:AAA").is_none());
}

#[tokio::test]
async fn scenario_5_delayed_invalidation_fires_after_delay_not_before() {
    let h = harness();
    let descriptor = descriptor(60);
    h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();

    let rule = InvalidationRuleSpec {
        event_type: "trade.created".into(),
        patterns: vec!["trades:{s}*".into()],
        condition: None,
        r#async: true,
        delay_seconds: Some(2),
    }
    .into_rule()
    .unwrap();
    h.engine.register_rule(rule);

    let mut data = HashMap::new();
    data.insert("s".to_string(), "AAA".to_string());
    h.event_bus.publish_sync(&CacheEvent::new("trade.created", "test", data));

    let store = h.cache_manager.get("trades").unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(store.get("trades:AAA").is_some(), "must not fire before the delay elapses");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(store.get("trades:AAA").is_none(), "must have fired once the delay elapsed");
}

#[tokio::test]
async fn scenario_6_single_flight_stampede_under_bounded_cache() {
    let cache_manager = CacheManager::new(CacheStoreConfig {
        max_entries: 10,
        default_ttl_seconds: 60,
    });
    let store = cache_manager.get_or_create_default("stampede");
    for i in 0..9i64 {
        store.put(format!("warm:{i}"), Value::Integer(i), Some(60));
    }

    let single_flight = Arc::new(cachegate::cache::SingleFlight::new());
    let invocations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let single_flight = single_flight.clone();
        let invocations = invocations.clone();
        handles.push(async move {
            single_flight
                .run("K", move || {
                    let invocations = invocations.clone();
                    async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(Value::Integer(42))
                    }
                })
                .await
        });
    }
    let results = futures_join_all(handles).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    for r in results {
        assert_eq!(r.unwrap(), Value::Integer(42));
    }

    store.put("K".to_string(), Value::Integer(42), Some(60));
    assert!(store.size() <= 10);
}

/// Minimal join-all for a `Vec` of futures, avoiding a direct dependency on
/// the `futures` crate for a single call site.
async fn futures_join_all<F, T>(futures: Vec<F>) -> Vec<T>
where
    F: std::future::Future<Output = T>,
{
    let mut handles = Vec::with_capacity(futures.len());
    for fut in futures {
        handles.push(tokio::spawn(fut));
    }
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.await.expect("task panicked"));
    }
    out
}

#[tokio::test]
async fn p6_metrics_accounting_holds_after_mixed_hits_and_misses() {
    let h = harness();
    let descriptor = descriptor(60);

    h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();
    h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();
    h.executor.execute(&descriptor, params("AAA"), None).await.unwrap();

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.total_requests, snapshot.total_hits + snapshot.total_misses);
    assert_eq!(snapshot.total_misses, 1);
    assert_eq!(snapshot.total_hits, 2);
}
