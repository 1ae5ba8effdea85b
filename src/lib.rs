//! CacheGate: a configuration-driven read-through cache, invalidation
//! engine, and generic query executor fronted by an HTTP API.
//!
//! Module map:
//! - [`cache`] — bounded TTL/LRU stores, a named-store registry, single-flight
//!   dedup, and key templating.
//! - [`events`] — the in-process pub/sub bus that cache invalidation and
//!   external callers publish onto.
//! - [`invalidation`] — rules that translate events into cache key
//!   invalidations.
//! - [`query`] — the read-through executor tying cache, single-flight,
//!   connections, and metrics together.
//! - [`connection`] — the connection-provider trait and pooling wrapper the
//!   query executor runs SQL through.
//! - [`config`] — YAML query/cache/invalidation descriptors and validation.
//! - [`metrics`] — per-query and aggregate counters.
//! - [`api`] — axum router, handlers, and error mapping.

pub mod api;
pub mod cache;
pub mod common;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod invalidation;
pub mod metrics;
pub mod query;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, used for response timestamps and
/// cache/metrics bookkeeping throughout the crate.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
