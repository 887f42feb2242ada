//! Key remapping: reconcile the oracle's freeform key spellings with the
//! canonical field names of a [`FieldTree`].
//!
//! Only keys change. Values are never coerced, converted or inferred, and
//! keys that match no field are kept as they are.

use crate::schema::FieldTree;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Normalize a key for matching: drop whitespace, `-` and `_`, then lowercase.
///
/// `"Left Ventricle"`, `"left_ventricle"` and `"LeftVentricle"` all become
/// `"leftventricle"`.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Rename the keys of `value` to the canonical names declared in `fields`.
///
/// - Arrays: every element is remapped with the same `fields` (the item tree).
/// - Objects: each key is matched by [`normalize_key`]; hits are renamed,
///   misses are kept. Nested objects and lists descend into the matched
///   field's child tree, or are copied through when there is none.
/// - Anything else, or `fields == None`: returned unchanged.
pub fn remap(value: &Value, fields: Option<&FieldTree>) -> Value {
    match (value, fields) {
        (Value::Array(items), _) => {
            Value::Array(items.iter().map(|item| remap(item, fields)).collect())
        }
        (Value::Object(map), Some(tree)) if !tree.is_empty() => remap_object(map, tree),
        _ => value.clone(),
    }
}

fn remap_object(map: &Map<String, Value>, tree: &FieldTree) -> Value {
    let lookup: HashMap<String, &str> = tree
        .names()
        .map(|name| (normalize_key(name), name))
        .collect();

    let mut out = Map::with_capacity(map.len());
    for (key, val) in map {
        let canonical = lookup
            .get(&normalize_key(key))
            .copied()
            .unwrap_or(key.as_str());
        if canonical != key {
            debug!(from = %key, to = %canonical, "remapped key");
        }

        let child = tree.get(canonical).and_then(|node| node.children.as_deref());
        let remapped = if val.is_object() || val.is_array() {
            remap(val, child)
        } else {
            val.clone()
        };
        out.insert(canonical.to_string(), remapped);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaComponent;
    use crate::testing::pericardium_schema;
    use serde_json::json;

    fn component() -> SchemaComponent {
        SchemaComponent::from_document("Pericardium", pericardium_schema()).unwrap()
    }

    #[test]
    fn test_normalizes_case_and_separators() {
        assert_eq!(normalize_key("Left Ventricle"), "leftventricle");
        assert_eq!(normalize_key("left_ventricle"), "leftventricle");
        assert_eq!(normalize_key("LeftVentricle"), "leftventricle");
        assert_eq!(normalize_key("left-ventricle "), "leftventricle");
    }

    #[test]
    fn test_renames_spelling_variants_to_canonical_field() {
        let doc = json!({
            "type": "object",
            "properties": {"left_ventricle": {"type": "string"}, "aorta": {"type": "string"}}
        });
        let c = SchemaComponent::from_document("Heart", doc).unwrap();
        for spelling in ["Left Ventricle", "left_ventricle", "LeftVentricle"] {
            let mut raw = Map::new();
            raw.insert(spelling.to_string(), json!("ok"));
            let out = remap(&Value::Object(raw), Some(c.fields()));
            assert_eq!(out, json!({"left_ventricle": "ok"}), "spelling {spelling}");
        }
    }

    #[test]
    fn test_canonical_tree_is_unchanged() {
        let c = component();
        let canonical = json!({
            "assessment": {
                "effusion_size": "Small",
                "comments": "trace",
                "findings": [{"location": "apex", "score": 2}]
            },
            "measurements": {"thickness": 3.2}
        });
        assert_eq!(remap(&canonical, Some(c.fields())), canonical);
    }

    #[test]
    fn test_descends_into_objects_and_list_items() {
        let c = component();
        let raw = json!({
            "Assessment": {
                "Effusion Size": "Large",
                "FINDINGS": [{"Location": "apex", "SCORE": 4}, {"location": "base"}]
            },
            "measurements": {"Thickness": "Not Measured"}
        });
        let out = remap(&raw, Some(c.fields()));
        assert_eq!(
            out,
            json!({
                "assessment": {
                    "effusion_size": "Large",
                    "findings": [{"location": "apex", "score": 4}, {"location": "base"}]
                },
                "measurements": {"thickness": "Not Measured"}
            })
        );
    }

    #[test]
    fn test_unknown_keys_are_kept_and_not_descended() {
        let c = component();
        let raw = json!({"Extra Notes": {"Some Key": 1}, "assessment": {}});
        let out = remap(&raw, Some(c.fields()));
        assert_eq!(out, json!({"Extra Notes": {"Some Key": 1}, "assessment": {}}));
    }

    #[test]
    fn test_lists_are_remapped_elementwise_with_item_tree() {
        let c = component();
        let findings = c.fields().get("assessment").unwrap().children.clone().unwrap();
        let item_tree = findings.get("findings").unwrap().children.clone().unwrap();
        let out = remap(&json!([{"Location": "a"}, 7, {"Score": 1}]), Some(item_tree.as_ref()));
        assert_eq!(out, json!([{"location": "a"}, 7, {"score": 1}]));
    }

    #[test]
    fn test_scalars_and_missing_tree_pass_through() {
        assert_eq!(remap(&json!(4.2), None), json!(4.2));
        assert_eq!(remap(&json!({"A B": 1}), None), json!({"A B": 1}));
    }
}
