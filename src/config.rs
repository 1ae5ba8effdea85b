//! Typed configuration surface: the `QueryDescriptor`/`CacheSpec`/
//! `InvalidationRuleSpec` shapes loaded from YAML, validated at load time
//! into the types the core actually consumes (no reflective coercion at
//! call time).

use std::time::Duration;

use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::invalidation::InvalidationRule;

fn default_true() -> bool {
    true
}

/// The as-authored invalidation rule shape. `patterns` may reference
/// `{placeholder}`s rendered against event data at fire time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationRuleSpec {
    pub event_type: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default = "default_true")]
    pub r#async: bool,
    #[serde(default)]
    pub delay_seconds: Option<u64>,
}

impl InvalidationRuleSpec {
    pub fn into_rule(self) -> Result<InvalidationRule> {
        InvalidationRule::new(
            self.event_type,
            self.patterns,
            self.condition,
            self.r#async,
            self.delay_seconds.map(Duration::from_secs),
        )
    }
}

/// Cache configuration for one query, as authored in YAML.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cache_name: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub key_pattern_template: Option<String>,
    /// Simple-form invalidation: each entry is sugar for a synthesized rule
    /// whose only pattern is `key_pattern_template` with a trailing `*`.
    #[serde(default)]
    pub invalidate_on: Vec<String>,
    #[serde(default)]
    pub invalidation_rules: Vec<InvalidationRuleSpec>,
}

impl CacheSpec {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.cache_name.as_deref().unwrap_or("").is_empty() {
            return Err(CoreError::BadRequest(
                "cache.cacheName is required when cache.enabled is true".to_string(),
            ));
        }
        Ok(())
    }

    /// Both `invalidate_on` and `invalidation_rules` are registered as
    /// independent rules; an event type listed in both produces duplicate
    /// (harmless, idempotent) invalidation work rather than being merged.
    pub fn derived_rules(&self) -> Result<Vec<InvalidationRule>> {
        let mut rules = Vec::new();

        for event_type in &self.invalidate_on {
            let pattern = match &self.key_pattern_template {
                Some(template) => format!("{}*", strip_trailing_wildcard(template)),
                None => format!("{}*", self.cache_name.clone().unwrap_or_default()),
            };
            rules.push(InvalidationRule::new(
                event_type.clone(),
                vec![pattern],
                None,
                true,
                None,
            )?);
        }

        for spec in self.invalidation_rules.clone() {
            rules.push(spec.into_rule()?);
        }

        Ok(rules)
    }
}

fn strip_trailing_wildcard(template: &str) -> &str {
    template.strip_suffix('*').unwrap_or(template)
}

/// A query the executor can run: SQL text, its positional parameters, and
/// the cache behavior layered on top of it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    pub name: String,
    pub database_name: String,
    pub sql_text: String,
    #[serde(default)]
    pub parameter_names: Vec<String>,
    #[serde(default)]
    pub cache: CacheSpec,
}

impl QueryDescriptor {
    /// Validates `cache.enabled`, `cache.cacheName` (required when
    /// enabled), `cache.ttlSeconds >= 0` (trivially true for `u64`, kept as
    /// an explicit check site for forward compatibility), and
    /// pattern non-emptiness on every invalidation rule.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::BadRequest("query name must not be empty".to_string()));
        }
        self.cache.validate()?;
        self.cache.derived_rules().map(|_| ())
    }
}

/// The top-level YAML document shape: a list of query descriptors.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigDocument {
    #[serde(default)]
    pub queries: Vec<QueryDescriptor>,
}

/// Parses and validates every query descriptor in a YAML document.
pub fn load_queries(yaml: &str) -> Result<Vec<QueryDescriptor>> {
    let doc: RawConfigDocument = serde_yaml::from_str(yaml)?;
    for query in &doc.queries {
        query.validate()?;
    }
    Ok(doc.queries)
}
