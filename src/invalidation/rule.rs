//! `InvalidationRule` and its condition language.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// A registered invalidation rule: on a matching event, optionally gated by
/// `condition`, render `patterns` against the event's data and delete the
/// matching cache keys.
#[derive(Debug, Clone)]
pub struct InvalidationRule {
    pub event_type: String,
    pub patterns: Vec<String>,
    pub condition: Option<String>,
    pub is_async: bool,
    pub delay: Option<Duration>,
}

impl InvalidationRule {
    pub fn new(
        event_type: impl Into<String>,
        patterns: Vec<String>,
        condition: Option<String>,
        is_async: bool,
        delay: Option<Duration>,
    ) -> Result<Self> {
        if patterns.is_empty() {
            return Err(CoreError::BadRequest(
                "invalidation rule must have at least one pattern".to_string(),
            ));
        }
        Ok(Self {
            event_type: event_type.into(),
            patterns,
            condition,
            is_async,
            delay,
        })
    }

    /// Evaluates `condition` against `data`. A missing key is always false.
    /// An unparseable condition is also false — the engine logs and skips
    /// rather than treating this as fatal.
    pub fn condition_matches(&self, data: &HashMap<String, String>) -> bool {
        match &self.condition {
            None => true,
            Some(expr) => match Condition::parse(expr) {
                Some(cond) => cond.evaluate(data),
                None => {
                    tracing::warn!(condition = %expr, event_type = %self.event_type, "unparseable invalidation condition, skipping rule");
                    false
                }
            },
        }
    }
}

enum Condition {
    Eq(String, String),
    Ne(String, String),
    In(String, Vec<String>),
}

impl Condition {
    fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        if let Some(rest) = expr.find(" IN ") {
            let key = expr[..rest].trim().to_string();
            let values_part = expr[rest + 4..].trim();
            let values_part = values_part.strip_prefix('(')?.strip_suffix(')')?;
            let values = values_part
                .split(',')
                .map(|v| v.trim().to_string())
                .collect();
            return Some(Condition::In(key, values));
        }
        if let Some((key, value)) = expr.split_once("!=") {
            return Some(Condition::Ne(key.trim().to_string(), value.trim().to_string()));
        }
        if let Some((key, value)) = expr.split_once('=') {
            return Some(Condition::Eq(key.trim().to_string(), value.trim().to_string()));
        }
        None
    }

    fn evaluate(&self, data: &HashMap<String, String>) -> bool {
        match self {
            Condition::Eq(key, value) => data.get(key).is_some_and(|v| v == value),
            Condition::Ne(key, value) => data.get(key).is_some_and(|v| v != value),
            Condition::In(key, values) => data.get(key).is_some_and(|v| values.contains(v)),
        }
    }
}
