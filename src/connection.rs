//! `ConnectionProvider`: the interface the query executor consumes to reach
//! a database. The core never constructs pools, only consumes this trait;
//! `InMemoryConnectionProvider` and `PooledConnectionProvider` are the two
//! concrete collaborators this repo ships so the executor is runnable
//! end-to-end without a real database driver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::common::{Row, Value};
use crate::error::{CoreError, Result};

/// An acquired, live connection. Holds an optional pool permit so a
/// `PooledConnectionProvider` layer can tie concurrency bounds to the
/// handle's lifetime without the executor knowing pooling exists.
pub struct ConnectionHandle {
    pub id: u64,
    pub database_name: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionHandle {
    pub fn new(id: u64, database_name: impl Into<String>) -> Self {
        Self {
            id,
            database_name: database_name.into(),
            permit: None,
        }
    }
}

#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Acquires a connection to `database_name`, failing `NotFound` if the
    /// database is unknown and `Unavailable` if none can be acquired.
    async fn acquire(&self, database_name: &str) -> Result<ConnectionHandle>;

    /// Executes `sql` with bound `params` against `handle`, materializing
    /// rows into the stable `Row` form.
    async fn execute(&self, handle: &ConnectionHandle, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Returns a connection to the provider. Always called exactly once per
    /// successful `acquire`, via `ConnectionGuard`'s `Drop`.
    async fn release(&self, handle: ConnectionHandle);
}

/// RAII guard that guarantees `ConnectionProvider::release` runs on every
/// exit path — including panics unwinding through the executor — by
/// scheduling it in `Drop`. Release itself is async, so `Drop` hands it to
/// a detached task rather than blocking.
pub struct ConnectionGuard {
    provider: Arc<dyn ConnectionProvider>,
    handle: Option<ConnectionHandle>,
}

impl ConnectionGuard {
    pub async fn acquire(provider: Arc<dyn ConnectionProvider>, database_name: &str) -> Result<Self> {
        let handle = provider.acquire(database_name).await?;
        Ok(Self {
            provider,
            handle: Some(handle),
        })
    }

    pub fn handle(&self) -> &ConnectionHandle {
        self.handle.as_ref().expect("connection handle released")
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let provider = self.provider.clone();
            tokio::spawn(async move {
                provider.release(handle).await;
            });
        }
    }
}

/// A test double backed by an in-memory table of canned responses, keyed by
/// `(databaseName, sqlText)`. Never blocks, never fails acquisition.
pub struct InMemoryConnectionProvider {
    next_id: AtomicU64,
    responses: RwLock<HashMap<(String, String), Vec<Row>>>,
    known_databases: RwLock<std::collections::HashSet<String>>,
}

impl InMemoryConnectionProvider {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            responses: RwLock::new(HashMap::new()),
            known_databases: RwLock::new(std::collections::HashSet::new()),
        }
    }

    pub fn seed(&self, database_name: impl Into<String>, sql: impl Into<String>, rows: Vec<Row>) {
        let database_name = database_name.into();
        self.known_databases.write().insert(database_name.clone());
        self.responses.write().insert((database_name, sql.into()), rows);
    }
}

impl Default for InMemoryConnectionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionProvider for InMemoryConnectionProvider {
    async fn acquire(&self, database_name: &str) -> Result<ConnectionHandle> {
        if !self.known_databases.read().contains(database_name) {
            return Err(CoreError::NotFound(format!("unknown database: {database_name}")));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(ConnectionHandle::new(id, database_name))
    }

    async fn execute(&self, handle: &ConnectionHandle, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        self.responses
            .read()
            .get(&(handle.database_name.clone(), sql.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::internal_with_sql_state(format!("no seeded response for: {sql}"), "42000"))
    }

    async fn release(&self, _handle: ConnectionHandle) {}
}

/// Wraps another provider with a bounded-concurrency pool, the way this
/// codebase's connection pool bounds a `ConnectionFactory`: acquisition
/// blocks for a free permit, and the permit rides along on the handle so
/// release frees it automatically when the guard drops.
pub struct PooledConnectionProvider {
    inner: Arc<dyn ConnectionProvider>,
    permits: Arc<Semaphore>,
}

impl PooledConnectionProvider {
    pub fn new(inner: Arc<dyn ConnectionProvider>, pool_size: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }
}

#[async_trait]
impl ConnectionProvider for PooledConnectionProvider {
    async fn acquire(&self, database_name: &str) -> Result<ConnectionHandle> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::Unavailable("connection pool closed".to_string()))?;
        let mut handle = self.inner.acquire(database_name).await?;
        handle.permit = Some(permit);
        Ok(handle)
    }

    async fn execute(&self, handle: &ConnectionHandle, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.inner.execute(handle, sql, params).await
    }

    async fn release(&self, handle: ConnectionHandle) {
        self.inner.release(handle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_database_is_not_found() {
        let provider = InMemoryConnectionProvider::new();
        let err = provider.acquire("ghost").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn seeded_query_returns_rows() {
        let provider = InMemoryConnectionProvider::new();
        provider.seed("trades_db", "SELECT * FROM trades", vec![vec![Value::Integer(1)]]);
        let handle = provider.acquire("trades_db").await.unwrap();
        let rows = provider.execute(&handle, "SELECT * FROM trades", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1)]]);
    }

    #[tokio::test]
    async fn pooled_provider_bounds_concurrency() {
        let inner = Arc::new(InMemoryConnectionProvider::new());
        inner.seed("db", "SELECT 1", vec![vec![Value::Integer(1)]]);
        let pooled = Arc::new(PooledConnectionProvider::new(inner, 1));

        let first = ConnectionGuard::acquire(pooled.clone(), "db").await.unwrap();
        let second = {
            let pooled = pooled.clone();
            tokio::time::timeout(std::time::Duration::from_millis(50), async move {
                ConnectionGuard::acquire(pooled, "db").await
            })
            .await
        };
        assert!(second.is_err(), "second acquire must block while pool_size=1 is held");
        drop(first);
    }
}
