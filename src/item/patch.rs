//! JSON merge-patch (RFC 7386) over `serde_json::Value`.
//!
//! History entries store the patch that turns an item's current entry
//! back into its previous state, so applying patches newest-to-oldest
//! reconstructs older and older entries.

use serde_json::{Map, Value};

/// Compute the merge-patch that transforms `from` into `to`.
///
/// Keys present in `from` but absent from `to` become `null` (RFC 7386
/// deletion); nested objects are diffed recursively.
pub fn merge_diff(from: &Value, to: &Value) -> Value {
    match (from, to) {
        (Value::Object(from_map), Value::Object(to_map)) => {
            let mut patch = Map::new();
            for (key, to_val) in to_map {
                match from_map.get(key) {
                    Some(from_val) if from_val == to_val => {}
                    Some(from_val) => {
                        patch.insert(key.clone(), merge_diff(from_val, to_val));
                    }
                    None => {
                        patch.insert(key.clone(), to_val.clone());
                    }
                }
            }
            for key in from_map.keys() {
                if !to_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => to.clone(),
    }
}

/// Apply a merge-patch to `doc`, returning the patched document.
pub fn merge_apply(doc: &Value, patch: &Value) -> Value {
    match patch {
        Value::Object(patch_map) => {
            let mut result = match doc {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            for (key, patch_val) in patch_map {
                if patch_val.is_null() {
                    result.remove(key);
                } else {
                    let base = result.get(key).cloned().unwrap_or(Value::Null);
                    result.insert(key.clone(), merge_apply(&base, patch_val));
                }
            }
            Value::Object(result)
        }
        _ => patch.clone(),
    }
}
