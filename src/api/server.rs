//! Assembles the axum `Router`: route table, CORS, tracing, timeout, and
//! request body size limits.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::cors::permissive_cors;
use super::handlers;
use super::prometheus;
use super::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/query/{name}", post(handlers::execute_query))
        .route("/api/v1/events", post(handlers::publish_event))
        .route("/api/v1/events/sync", post(handlers::publish_event_sync))
        .route("/api/v1/cache/stats", get(handlers::cache_statistics))
        .route("/api/v1/cache/invalidate", post(handlers::manual_invalidate))
        .route("/api/v1/invalidation/stats", get(handlers::invalidation_statistics))
        .route("/api/v1/metrics", get(handlers::query_metrics))
        .route("/metrics", get(prometheus::render))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(permissive_cors())
        .with_state(state)
}
