//! Deterministic cache key construction and pattern matching.

use std::collections::HashMap;

use crate::common::Value;

/// Builds a cache key from a `{placeholder}` template and bound parameters,
/// falling back to `queryName:joined-values` when no template is given.
pub struct KeyBuilder;

impl KeyBuilder {
    /// Substitutes every `{name}` placeholder in `template` with the
    /// stringified parameter of the same name. Placeholders with no bound
    /// parameter are left as the literal `{name}`.
    pub fn build(
        template: Option<&str>,
        query_name: &str,
        params: &HashMap<String, Value>,
    ) -> String {
        match template {
            Some(template) => Self::substitute(template, params),
            None => {
                let joined = params
                    .values()
                    .map(Value::as_key_fragment)
                    .collect::<Vec<_>>()
                    .join(":");
                format!("{query_name}:{joined}")
            }
        }
    }

    fn substitute(template: &str, params: &HashMap<String, Value>) -> String {
        let mut out = String::with_capacity(template.len());
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = template[i..].find('}') {
                    let name = &template[i + 1..i + end];
                    match params.get(name) {
                        Some(value) => out.push_str(&value.as_key_fragment()),
                        None => out.push_str(&template[i..i + end + 1]),
                    }
                    i += end + 1;
                    continue;
                }
            }
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }

    /// Renders a rule pattern's `{placeholder}`s against event data, with
    /// missing placeholders degrading to `*` rather than being left literal.
    pub fn render_pattern(pattern: &str, event_data: &HashMap<String, String>) -> String {
        let mut out = String::with_capacity(pattern.len());
        let mut i = 0;
        let bytes = pattern.as_bytes();
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = pattern[i..].find('}') {
                    let name = &pattern[i + 1..i + end];
                    match event_data.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push('*'),
                    }
                    i += end + 1;
                    continue;
                }
            }
            let ch = pattern[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }

    /// Byte-exact matching with an optional single trailing `*` wildcard
    /// meaning "any suffix".
    pub fn matches(candidate: &str, pattern: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => candidate.starts_with(prefix),
            None => candidate == pattern,
        }
    }
}
