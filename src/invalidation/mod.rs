//! Event-driven cache invalidation: rule registry, condition language, and
//! delayed/async dispatch onto `CacheManager::invalidate`.

pub mod engine;
pub mod rule;
pub mod stats;

pub use engine::{InvalidationEngine, RuleInvalidationStats};
pub use rule::InvalidationRule;
pub use stats::RuleStatisticsSnapshot;
