//! JSON merge patches (RFC 7386)
//!
//! Machines are written back as the difference between the object read at the
//! start of a pass and the object as modified, so fields the pass did not touch
//! are never sent and cannot clobber concurrent writers. Applying a patch is
//! `json_patch::merge`; only the diff side lives here.

use serde_json::{Map, Value};

/// Compute the merge patch turning `original` into `modified`.
///
/// Returns an empty object when the two are equal.
pub fn diff(original: &Value, modified: &Value) -> Value {
    if original == modified {
        return Value::Object(Map::new());
    }
    match (original, modified) {
        (Value::Object(from), Value::Object(to)) => {
            let mut patch = Map::new();
            for (key, new_value) in to {
                match from.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value @ Value::Object(_)) if new_value.is_object() => {
                        patch.insert(key.clone(), diff(old_value, new_value));
                    }
                    _ => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in from.keys() {
                if !to.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Whether a patch carries no changes.
pub fn is_empty(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_only_carries_changed_fields() {
        let original = json!({"metadata": {"name": "m", "labels": {"a": "1"}}, "spec": {"x": 1}});
        let modified = json!({"metadata": {"name": "m", "labels": {"a": "1", "b": "2"}}, "spec": {"x": 1}});
        assert_eq!(diff(&original, &modified), json!({"metadata": {"labels": {"b": "2"}}}));
    }

    #[test]
    fn test_diff_nulls_removed_fields() {
        let original = json!({"a": 1, "b": 2});
        let modified = json!({"a": 1});
        assert_eq!(diff(&original, &modified), json!({"b": null}));
    }

    #[test]
    fn test_diff_replaces_lists_wholesale() {
        let original = json!({"finalizers": ["a"]});
        let modified = json!({"finalizers": ["a", "b"]});
        assert_eq!(diff(&original, &modified), json!({"finalizers": ["a", "b"]}));
    }

    #[test]
    fn test_diff_of_equal_values_is_empty() {
        let value = json!({"a": {"b": [1, 2]}});
        assert!(is_empty(&diff(&value, &value)));
    }

    #[test]
    fn test_merging_diff_reproduces_modified() {
        let original = json!({"metadata": {"name": "m", "annotations": {"x": "1"}}, "status": {"phase": "Provisioning"}});
        let modified = json!({"metadata": {"name": "m"}, "status": {"phase": "Running", "ready": true}});
        let mut target = original.clone();
        json_patch::merge(&mut target, &diff(&original, &modified));
        assert_eq!(target, modified);
    }
}
