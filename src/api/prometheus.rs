//! Prometheus-text rendering of the in-process metrics and cache counters.
//! Additive observability plumbing alongside the JSON `queryMetrics`
//! endpoint; it renders the same counters, nothing more.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::state::AppState;

pub async fn render(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let out = render_text(&state);
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], out)
}

fn render_text(state: &AppState) -> String {
    let mut out = String::new();
    let metrics = state.metrics.snapshot();

    let _ = writeln!(out, "# HELP cachegate_requests_total Total query executions observed.");
    let _ = writeln!(out, "# TYPE cachegate_requests_total counter");
    let _ = writeln!(out, "cachegate_requests_total {}", metrics.total_requests);

    let _ = writeln!(out, "# HELP cachegate_cache_hit_rate Fraction of requests served from cache.");
    let _ = writeln!(out, "# TYPE cachegate_cache_hit_rate gauge");
    let _ = writeln!(out, "cachegate_cache_hit_rate {}", metrics.hit_rate);

    let _ = writeln!(
        out,
        "# HELP cachegate_cache_response_ms Average cache-served response time in milliseconds."
    );
    let _ = writeln!(out, "# TYPE cachegate_cache_response_ms gauge");
    let _ = writeln!(out, "cachegate_cache_response_ms {}", metrics.average_cache_response_time_ms);

    let _ = writeln!(
        out,
        "# HELP cachegate_database_response_ms Average database-served response time in milliseconds."
    );
    let _ = writeln!(out, "# TYPE cachegate_database_response_ms gauge");
    let _ = writeln!(
        out,
        "cachegate_database_response_ms {}",
        metrics.average_database_response_time_ms
    );

    let _ = writeln!(out, "# HELP cachegate_cache_entries Resident entry count per named cache.");
    let _ = writeln!(out, "# TYPE cachegate_cache_entries gauge");
    for (name, stats) in state.cache_manager.statistics() {
        let _ = writeln!(out, "cachegate_cache_entries{{cache=\"{name}\"}} {}", stats.size);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, CacheStoreConfig};
    use crate::connection::InMemoryConnectionProvider;
    use crate::events::EventBus;
    use crate::invalidation::InvalidationEngine;
    use crate::metrics::MetricsCollector;
    use crate::query::QueryExecutor;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    #[tokio::test]
    async fn renders_known_counter_names() {
        let cache_manager = CacheManager::new(CacheStoreConfig::default());
        let event_bus = Arc::new(EventBus::with_worker_count(2));
        let engine = InvalidationEngine::new(cache_manager.clone(), event_bus.clone());
        let metrics = Arc::new(MetricsCollector::new());
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let executor = Arc::new(QueryExecutor::new(cache_manager.clone(), provider, metrics.clone()));

        let state = Arc::new(AppState {
            cache_manager,
            invalidation_engine: engine,
            event_bus,
            metrics,
            query_executor: executor,
            queries: RwLock::new(HashMap::new()),
        });

        let body = render_text(&state);
        assert!(body.contains("cachegate_requests_total"));
        assert!(body.contains("cachegate_cache_hit_rate"));
    }
}
