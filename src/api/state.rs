//! Shared application state handed to every axum handler.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::CacheManager;
use crate::config::QueryDescriptor;
use crate::events::EventBus;
use crate::invalidation::InvalidationEngine;
use crate::metrics::MetricsCollector;
use crate::query::QueryExecutor;

pub struct AppState {
    pub cache_manager: Arc<CacheManager>,
    pub invalidation_engine: Arc<InvalidationEngine>,
    pub event_bus: Arc<EventBus>,
    pub metrics: Arc<MetricsCollector>,
    pub query_executor: Arc<QueryExecutor>,
    pub queries: RwLock<HashMap<String, QueryDescriptor>>,
}

impl AppState {
    pub fn query(&self, name: &str) -> Option<QueryDescriptor> {
        self.queries.read().get(name).cloned()
    }

    pub fn register_query(&self, descriptor: QueryDescriptor) {
        self.queries.write().insert(descriptor.name.clone(), descriptor);
    }
}
