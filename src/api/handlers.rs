//! HTTP handlers binding the external interfaces in `spec.md` §6 onto axum.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use super::dto::PagedResponse;
use super::error::ApiError;
use super::state::AppState;
use crate::cache::CacheStoreStatistics;
use crate::common::Value;
use crate::error::CoreError;
use crate::events::CacheEvent;
use crate::invalidation::RuleInvalidationStats;
use crate::metrics::MetricsSnapshot;

fn default_source() -> String {
    "http".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryRequest {
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub deadline_millis: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteQueryResponse {
    pub rows: Vec<Vec<serde_json::Value>>,
}

pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<ExecuteQueryRequest>,
) -> Result<Json<ExecuteQueryResponse>, ApiError> {
    let descriptor = state
        .query(&name)
        .ok_or_else(|| CoreError::NotFound(format!("unknown query: {name}")))?;
    let params = req
        .params
        .into_iter()
        .map(|(k, v)| (k, Value::from_json(v)))
        .collect();
    let deadline = req.deadline_millis.map(|ms| Instant::now() + Duration::from_millis(ms));

    let rows = state.query_executor.execute(&descriptor, params, deadline).await?;
    let rows = rows
        .into_iter()
        .map(|row| row.iter().map(Value::to_json).collect())
        .collect();
    Ok(Json(ExecuteQueryResponse { rows }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventRequest {
    pub event_type: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct PublishEventResponse {
    pub accepted: bool,
}

pub async fn publish_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishEventRequest>,
) -> Json<PublishEventResponse> {
    state.event_bus.publish(CacheEvent::new(req.event_type, req.source, req.data));
    Json(PublishEventResponse { accepted: true })
}

pub async fn publish_event_sync(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishEventRequest>,
) -> Json<PublishEventResponse> {
    state
        .event_bus
        .publish_sync(&CacheEvent::new(req.event_type, req.source, req.data));
    Json(PublishEventResponse { accepted: true })
}

pub async fn cache_statistics(State(state): State<Arc<AppState>>) -> Json<HashMap<String, CacheStoreStatistics>> {
    Json(state.cache_manager.statistics())
}

fn default_page_size() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub size: usize,
}

pub async fn invalidation_statistics(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> Json<PagedResponse<RuleInvalidationStats>> {
    let size = page.size.max(1);
    Json(PagedResponse::new(state.invalidation_engine.statistics(), page.page, size))
}

pub async fn query_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualInvalidateRequest {
    pub patterns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ManualInvalidateResponse {
    pub deleted: usize,
}

pub async fn manual_invalidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManualInvalidateRequest>,
) -> Json<ManualInvalidateResponse> {
    let deleted = state.invalidation_engine.manual_invalidate(&req.patterns);
    Json(ManualInvalidateResponse { deleted })
}
