//! Shared execution context: the write-once key/value store nodes read and
//! publish through, plus `${KEY}` template resolution (§4.3).

use std::collections::HashMap;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

static TEMPLATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("valid regex"));

/// Per-execution shared state. One `SharedContext` is created per workflow
/// run and handed to every node task as they're spawned; `publish` is
/// write-once per key so a node's output can never be silently clobbered by
/// a later one reusing the same context key.
#[derive(Debug, Default)]
pub struct SharedContext {
    values: DashMap<String, Value>,
}

impl SharedContext {
    pub fn new(workflow_id: Uuid, execution_id: Uuid, input_data: Value) -> Self {
        let ctx = Self::default();
        ctx.values.insert("workflow_id".to_string(), Value::String(workflow_id.to_string()));
        ctx.values.insert("execution_id".to_string(), Value::String(execution_id.to_string()));
        ctx.values.insert("input".to_string(), input_data);
        ctx
    }

    /// Publish a node's result. Writes three keys, each exactly once (§3):
    /// `node_<id>_output` and `node_<id>_metadata` are the canonical record
    /// of what the node produced, scanned back out at workflow termination
    /// for output extraction (§4.6); `dependency_<node_id>` is the same
    /// output mirrored under the name downstream nodes inject it by (§4.3).
    /// No-op on any key that was already published.
    pub fn publish_node_output(&self, node_id: &str, output: Value, metadata: Value) {
        self.values.entry(format!("node_{node_id}_output")).or_insert_with(|| output.clone());
        self.values.entry(format!("node_{node_id}_metadata")).or_insert(metadata);
        self.values.entry(format!("dependency_{node_id}")).or_insert(output);
    }

    /// Write an arbitrary key once. Returns `false` if the key already held
    /// a value (it is left untouched).
    pub fn set_once(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.values.contains_key(&key) {
            return false;
        }
        self.values.entry(key).or_insert(value);
        true
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.clone())
    }

    /// A point-in-time copy of every key currently in the context, for
    /// passing to condition evaluation and journal snapshots.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }
}

/// Resolve every `${KEY}` placeholder in `value` against `context`,
/// recursing into objects and arrays. Bare identifiers only — no dotted
/// paths, no expressions. A key with no match in `context` is left as
/// literal text (§4.3): there is no error path for a missing key.
pub fn resolve_templates(value: &Value, context: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => resolve_string(s, context),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_templates(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_templates(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, context: &HashMap<String, Value>) -> Value {
    // A string that is *entirely* one placeholder resolves to the
    // referenced value's native JSON type rather than its stringification,
    // so `"${dependency_fetch}"` can carry an object or number through.
    if let Some(caps) = TEMPLATE_PATTERN.captures(s) {
        if caps.get(0).map(|m| m.as_str()) == Some(s) {
            let key = &caps[1];
            if let Some(v) = context.get(key) {
                return v.clone();
            }
            return Value::String(s.to_string());
        }
    }

    let resolved = TEMPLATE_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let key = &caps[1];
        match context.get(key) {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        }
    });
    Value::String(resolved.into_owned())
}

/// Merge a node's declared `dependency_<id>` outputs into its `input_data`
/// before template resolution, per §4.3's node-input preparation step.
pub fn inject_dependency_outputs(
    input_data: &Value,
    dependency_ids: &[String],
    context: &SharedContext,
) -> Value {
    let mut merged = input_data.clone();
    let Some(obj) = merged.as_object_mut() else {
        return merged;
    };
    for dep_id in dependency_ids {
        let key = format!("dependency_{dep_id}");
        if let Some(output) = context.get(&key) {
            obj.insert(key, output);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_placeholder_substitutes_native_type() {
        let mut ctx = HashMap::new();
        ctx.insert("count".to_string(), json!(42));
        let resolved = resolve_templates(&json!("${count}"), &ctx);
        assert_eq!(resolved, json!(42));
    }

    #[test]
    fn embedded_placeholder_substitutes_as_text() {
        let mut ctx = HashMap::new();
        ctx.insert("name".to_string(), json!("world"));
        let resolved = resolve_templates(&json!("hello ${name}!"), &ctx);
        assert_eq!(resolved, json!("hello world!"));
    }

    #[test]
    fn missing_key_is_left_literal() {
        let ctx = HashMap::new();
        let resolved = resolve_templates(&json!("${missing}"), &ctx);
        assert_eq!(resolved, json!("${missing}"));
    }

    #[test]
    fn recurses_into_nested_structures() {
        let mut ctx = HashMap::new();
        ctx.insert("x".to_string(), json!("y"));
        let input = json!({ "a": ["${x}", { "b": "${x}" }] });
        let resolved = resolve_templates(&input, &ctx);
        assert_eq!(resolved, json!({ "a": ["y", { "b": "y" }] }));
    }

    #[test]
    fn publish_is_write_once() {
        let ctx = SharedContext::new(Uuid::new_v4(), Uuid::new_v4(), Value::Null);
        ctx.publish_node_output("a", json!({"v": 1}), Value::Null);
        ctx.publish_node_output("a", json!({"v": 2}), Value::Null);
        assert_eq!(ctx.get("dependency_a"), Some(json!({"v": 1})));
        assert_eq!(ctx.get("node_a_output"), Some(json!({"v": 1})));
    }

    #[test]
    fn publish_writes_output_and_metadata_keys() {
        let ctx = SharedContext::new(Uuid::new_v4(), Uuid::new_v4(), Value::Null);
        ctx.publish_node_output("a", json!({"v": 1}), json!({"cost": 0.5}));
        assert_eq!(ctx.get("node_a_output"), Some(json!({"v": 1})));
        assert_eq!(ctx.get("node_a_metadata"), Some(json!({"cost": 0.5})));
    }

    #[test]
    fn inject_dependency_outputs_merges_into_input() {
        let ctx = SharedContext::new(Uuid::new_v4(), Uuid::new_v4(), Value::Null);
        ctx.publish_node_output("fetch", json!({"status": "ok"}), Value::Null);
        let input = json!({"foo": "bar"});
        let merged = inject_dependency_outputs(&input, &["fetch".to_string()], &ctx);
        assert_eq!(
            merged,
            json!({"foo": "bar", "dependency_fetch": {"status": "ok"}})
        );
    }
}
