//! Canonical JSON serialization for tool-use payloads.

use serde_json::{Map, Value};

/// Serializes with all object keys sorted, recursively, so payloads that
/// differ only in key order produce identical strings.
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&sorted(value)).unwrap_or_else(|_| "null".to_string())
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|left, right| left.0.cmp(right.0));

            let mut out = Map::new();
            for (key, entry) in entries {
                out.insert(key.clone(), sorted(entry));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
