//! Deduplicates concurrent loads for the same key.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::common::Value;
use crate::error::{CoreError, Result};

type Slot = watch::Receiver<Option<Result<Value>>>;

/// `SingleFlight::run(key, loader)` guarantees at most one in-flight
/// execution of `loader` per key across all concurrent callers; everyone
/// waiting on that key observes the same result. A failure is not retained
/// past the in-flight window — once the call completes (success or error)
/// the slot is retired, so the *next* caller starts a fresh attempt.
///
/// The winning caller's `loader` runs in a detached task rather than inline
/// on that caller's own future. This matters under deadlines: if the
/// winning caller's `run` is wrapped in a timeout and cancelled, the loader
/// keeps running to completion and may still populate the cache, instead of
/// being torn down with whichever request happened to trigger it.
pub struct SingleFlight {
    inflight: Arc<DashMap<String, Slot>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub async fn run<F, Fut>(&self, key: &str, loader: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut rx = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx.clone());

                let inflight = self.inflight.clone();
                let key_owned = key.to_string();
                tokio::spawn(async move {
                    let result = loader().await;
                    let _ = tx.send(Some(result));
                    inflight.remove(&key_owned);
                });

                rx
            }
        };

        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(CoreError::internal("single-flight loader task ended without a result"));
            }
        }
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}
