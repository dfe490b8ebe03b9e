//! Shallow structural diff between two flat JSON objects.

use serde_json::{Map, Value};

/// Returns every key of `next` whose value differs from `prev` (or is new),
/// plus keys that disappeared from `next`, mapped to `null`.
pub fn shallow_diff(prev: &Map<String, Value>, next: &Map<String, Value>) -> Map<String, Value> {
    let mut changed: Map<String, Value> = next
        .iter()
        .filter(|(key, value)| prev.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for key in prev.keys() {
        if !next.contains_key(key) {
            changed.insert(key.clone(), Value::Null);
        }
    }

    changed
}
