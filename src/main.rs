//! CacheGate server entry point: loads query configuration, wires the
//! cache/invalidation/query core, and serves the HTTP API.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::sync::Arc;

use cachegate::api::{build_router, AppState};
use cachegate::cache::{CacheManager, CacheStoreConfig};
use cachegate::config;
use cachegate::connection::{ConnectionProvider, InMemoryConnectionProvider, PooledConnectionProvider};
use cachegate::error::{CoreError, Result};
use cachegate::events::EventBus;
use cachegate::invalidation::InvalidationEngine;
use cachegate::metrics::MetricsCollector;
use cachegate::query::QueryExecutor;
use parking_lot::RwLock;

const DEFAULT_CONFIG_PATH: &str = "config/queries.yaml";
const DEFAULT_POOL_SIZE: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let config_path = env::var("CACHEGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let queries = match fs::read_to_string(&config_path) {
        Ok(yaml) => config::load_queries(&yaml)?,
        Err(e) => {
            tracing::warn!(path = %config_path, error = %e, "no query configuration found, starting with none registered");
            Vec::new()
        }
    };

    let cache_manager = CacheManager::new(CacheStoreConfig::default());
    let event_bus = Arc::new(EventBus::new());
    let invalidation_engine = InvalidationEngine::new(cache_manager.clone(), event_bus.clone());
    let metrics = Arc::new(MetricsCollector::new());

    // A real deployment provides its own `ConnectionProvider` backed by a
    // driver for the databases named in `queries.yaml`; this in-memory
    // provider keeps the binary runnable standalone and is the natural
    // seam to replace.
    let inner_provider: Arc<dyn ConnectionProvider> = Arc::new(InMemoryConnectionProvider::new());
    let connection_provider: Arc<dyn ConnectionProvider> =
        Arc::new(PooledConnectionProvider::new(inner_provider, DEFAULT_POOL_SIZE));

    let query_executor = Arc::new(QueryExecutor::new(
        cache_manager.clone(),
        connection_provider,
        metrics.clone(),
    ));

    let state = Arc::new(AppState {
        cache_manager,
        invalidation_engine: invalidation_engine.clone(),
        event_bus,
        metrics,
        query_executor,
        queries: RwLock::new(HashMap::new()),
    });

    for descriptor in queries {
        for rule in descriptor.cache.derived_rules()? {
            invalidation_engine.register_rule(rule);
        }
        state.register_query(descriptor);
    }

    let bind_addr = env::var("CACHEGATE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| CoreError::internal(format!("failed to bind {bind_addr}: {e}")))?;
    tracing::info!(addr = %bind_addr, "cachegate listening");

    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| CoreError::internal(format!("server error: {e}")))?;
    Ok(())
}
