//! `CacheEvent` and the publish/subscribe `EventBus`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// An immutable domain event, published once and fanned out to subscribers.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub event_type: String,
    pub source: String,
    pub timestamp_millis: i64,
    pub data: HashMap<String, String>,
}

impl CacheEvent {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: HashMap<String, String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            timestamp_millis: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before unix epoch")
                .as_millis() as i64,
            data,
        }
    }
}

/// A registered subscriber callback. Listeners must be `Send + Sync` since
/// async delivery may run them on any worker-pool task.
pub type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

struct Subscription {
    id: Uuid,
    event_type: String,
    listener: Listener,
}

/// Publish/subscribe bus for `CacheEvent`. Async delivery is bounded by a
/// semaphore sized `max(2, num_cpus)`, matching the spec's worker-pool
/// minimum; synchronous delivery runs listeners on the publisher's thread
/// and completes before `publish_sync` returns.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    permits: Arc<Semaphore>,
    inflight: Arc<AtomicU64>,
    shutdown: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_worker_count(std::cmp::max(2, num_cpus::get()))
    }

    pub fn with_worker_count(workers: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            permits: Arc::new(Semaphore::new(workers.max(2))),
            inflight: Arc::new(AtomicU64::new(0)),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self, event_type: impl Into<String>, listener: Listener) -> Uuid {
        let id = Uuid::new_v4();
        self.subscriptions.write().push(Subscription {
            id,
            event_type: event_type.into(),
            listener,
        });
        id
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscriptions.write().retain(|s| s.id != id);
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.event_type == event_type)
            .count()
    }

    /// Fire-and-forget delivery. No-op after `shutdown()`. Per-listener
    /// delivery order is not guaranteed across listeners on this path.
    pub fn publish(&self, event: CacheEvent) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let listeners: Vec<Listener> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.event_type == event.event_type)
            .map(|s| s.listener.clone())
            .collect();

        for listener in listeners {
            let permits = self.permits.clone();
            let inflight = self.inflight.clone();
            let event = event.clone();
            inflight.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire().await else {
                    inflight.fetch_sub(1, Ordering::SeqCst);
                    return;
                };
                listener(&event);
                inflight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// Blocks until every matching listener has completed. Happens-before
    /// every side effect of those listeners by construction (run inline).
    pub fn publish_sync(&self, event: &CacheEvent) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let listeners: Vec<Listener> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.event_type == event.event_type)
            .map(|s| s.listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// After shutdown, `publish`/`publish_sync` are no-ops. Already-spawned
    /// async deliveries are allowed to drain (they hold their own Arc
    /// clones of shared state); no new work is accepted.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribe_unsubscribe_tracks_listener_count() {
        let bus = EventBus::with_worker_count(2);
        let id = bus.subscribe("trade.updated", Arc::new(|_| {}));
        assert_eq!(bus.listener_count("trade.updated"), 1);
        bus.unsubscribe(id);
        assert_eq!(bus.listener_count("trade.updated"), 0);
    }

    #[test]
    fn publish_sync_runs_listeners_before_returning() {
        let bus = EventBus::with_worker_count(2);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        bus.subscribe(
            "trade.updated",
            Arc::new(move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.publish_sync(&CacheEvent::new("trade.updated", "test", HashMap::new()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_is_noop_after_shutdown() {
        let bus = EventBus::with_worker_count(2);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        bus.subscribe(
            "trade.updated",
            Arc::new(move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.shutdown();
        bus.publish(CacheEvent::new("trade.updated", "test", HashMap::new()));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
