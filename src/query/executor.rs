//! `QueryExecutor`: the read-through path from bound parameters to rows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheManager, KeyBuilder, SingleFlight};
use crate::common::{Row, Value};
use crate::config::QueryDescriptor;
use crate::connection::{ConnectionGuard, ConnectionProvider};
use crate::error::{CoreError, Result};
use crate::metrics::{MetricsCollector, MetricsSample};

/// Wires the cache, single-flight dedup, connection provider, and metrics
/// collector into the seven-step read-through operation described for
/// `executeQuery`.
pub struct QueryExecutor {
    cache_manager: Arc<CacheManager>,
    single_flight: SingleFlight,
    connection_provider: Arc<dyn ConnectionProvider>,
    metrics: Arc<MetricsCollector>,
}

impl QueryExecutor {
    pub fn new(
        cache_manager: Arc<CacheManager>,
        connection_provider: Arc<dyn ConnectionProvider>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            cache_manager,
            single_flight: SingleFlight::new(),
            connection_provider,
            metrics,
        }
    }

    /// Runs `descriptor` against `params`, optionally bounded by `deadline`
    /// (wall-clock instant). On a deadline hit while waiting on the
    /// single-flight slot or connection acquisition, returns
    /// `DeadlineExceeded` — a loader already in flight keeps running and may
    /// still populate the cache.
    pub async fn execute(
        &self,
        descriptor: &QueryDescriptor,
        params: HashMap<String, Value>,
        deadline: Option<Instant>,
    ) -> Result<Vec<Row>> {
        let started = Instant::now();
        let bound = self.bind_params(descriptor, &params)?;

        if !descriptor.cache.enabled {
            return self
                .run_with_deadline(self.load(descriptor, bound, None, started), deadline)
                .await;
        }

        let cache_name = descriptor
            .cache
            .cache_name
            .as_deref()
            .ok_or_else(|| CoreError::internal("cache enabled without a cacheName"))?;
        let key = KeyBuilder::build(descriptor.cache.key_pattern_template.as_deref(), &descriptor.name, &params);

        if let Some(store) = self.cache_manager.get(cache_name) {
            if let Some(cached) = store.get(&key) {
                let rows = json_to_rows(cached)?;
                self.metrics.record(&MetricsSample::now(
                    descriptor.name.clone(),
                    true,
                    started.elapsed().as_millis() as u64,
                ));
                return Ok(rows);
            }
        }

        self.run_with_deadline(self.load(descriptor, bound, Some(key), started), deadline)
            .await
    }

    fn bind_params(&self, descriptor: &QueryDescriptor, params: &HashMap<String, Value>) -> Result<Vec<Value>> {
        descriptor
            .parameter_names
            .iter()
            .map(|name| {
                params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CoreError::BadRequest(format!("missing required parameter: {name}")))
            })
            .collect()
    }

    async fn run_with_deadline<F>(&self, fut: F, deadline: Option<Instant>) -> Result<Vec<Row>>
    where
        F: std::future::Future<Output = Result<Vec<Row>>>,
    {
        match deadline {
            None => fut.await,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::DeadlineExceeded),
                }
            }
        }
    }

    /// Performs single-flight dedup plus steps 5–7 (acquire, execute, put).
    ///
    /// The cache-populate step runs *inside* the single-flight loader
    /// closure, not in this function's own continuation — that closure is
    /// what actually executes inside `SingleFlight`'s detached task. Doing
    /// the `store.put` here instead would tie it to this caller's own
    /// future, so a caller whose deadline fires while waiting on
    /// `single_flight.run` would discard the populate along with everything
    /// else, even though the loader itself keeps running in the background.
    async fn load(
        &self,
        descriptor: &QueryDescriptor,
        bound: Vec<Value>,
        cache_key: Option<String>,
        started: Instant,
    ) -> Result<Vec<Row>> {
        let executor = ExecutorHandle {
            connection_provider: self.connection_provider.clone(),
            database_name: descriptor.database_name.clone(),
            sql_text: descriptor.sql_text.clone(),
            bound,
        };

        let rows = match &cache_key {
            Some(key) => {
                let key_for_loader = key.clone();
                let cache_manager = self.cache_manager.clone();
                let cache_enabled = descriptor.cache.enabled;
                let cache_name = descriptor.cache.cache_name.clone();
                let ttl_seconds = descriptor.cache.ttl_seconds;

                let value = self
                    .single_flight
                    .run(key, move || async move {
                        let rows = executor.run().await?;
                        if cache_enabled {
                            if let Some(cache_name) = cache_name.as_deref() {
                                let store = cache_manager.get_or_create_default(cache_name);
                                store.put(key_for_loader, rows_to_json(rows.clone()), ttl_seconds);
                            }
                        }
                        Ok(rows_to_json(rows))
                    })
                    .await?;
                json_to_rows(value)?
            }
            None => executor.run().await?,
        };

        self.metrics.record(&MetricsSample::now(
            descriptor.name.clone(),
            false,
            started.elapsed().as_millis() as u64,
        ));
        Ok(rows)
    }
}

/// The piece of `load` that actually needs `'static` to run inside
/// `SingleFlight::run`'s detached task.
struct ExecutorHandle {
    connection_provider: Arc<dyn ConnectionProvider>,
    database_name: String,
    sql_text: String,
    bound: Vec<Value>,
}

impl ExecutorHandle {
    async fn run(&self) -> Result<Vec<Row>> {
        let guard = ConnectionGuard::acquire(self.connection_provider.clone(), &self.database_name)
            .await
            .map_err(|e| match e {
                CoreError::NotFound(msg) => CoreError::NotFound(msg),
                other => CoreError::Unavailable(other.to_string()),
            })?;
        self.connection_provider
            .execute(guard.handle(), &self.sql_text, &self.bound)
            .await
    }
}

fn rows_to_json(rows: Vec<Row>) -> Value {
    let json_rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| serde_json::Value::Array(row.iter().map(Value::to_json).collect()))
        .collect();
    Value::Json(serde_json::Value::Array(json_rows))
}

fn json_to_rows(value: Value) -> Result<Vec<Row>> {
    match value {
        Value::Json(serde_json::Value::Array(rows)) => rows
            .into_iter()
            .map(|row| match row {
                serde_json::Value::Array(cells) => Ok(cells.into_iter().map(Value::from_json).collect()),
                _ => Err(CoreError::internal("cached row was not an array")),
            })
            .collect(),
        _ => Err(CoreError::internal("cached query result was not a row array")),
    }
}
