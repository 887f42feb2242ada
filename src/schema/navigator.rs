//! Navigation inside a single JSON Schema document.
//!
//! Three operations back the feedback loop:
//!
//! - [`resolve_ref`] follows a same-document `$ref` pointer.
//! - [`resolve_deep`] inlines every `$ref` inside a snippet, up to a bounded
//!   number of hops, so cyclic schemas always terminate.
//! - [`locate`] walks a validation error path (field names and array
//!   indices) down to the sub-schema that governs it.
//!
//! None of these panic or return partial `Option`s: anything that cannot be
//! resolved comes back as a [`NavError`] naming where navigation stopped.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

/// Default `$ref` hop budget for snippets handed to feedback generation.
pub const FEEDBACK_SNIPPET_DEPTH: usize = 3;

/// Default `$ref` hop budget for snippets written to attempt events.
pub const RECORD_SNIPPET_DEPTH: usize = 2;

/// Hop limit when following `$ref` chains on a single node.
pub(crate) const MAX_REF_HOPS: usize = 64;

/// One step of a location inside a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathStep {
    /// An object field.
    Key(String),
    /// An array index.
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(k) => f.write_str(k),
            PathStep::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.to_string())
    }
}

impl From<String> for PathStep {
    fn from(key: String) -> Self {
        PathStep::Key(key)
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        PathStep::Index(index)
    }
}

/// Render a path as `a.b.0.c`.
pub fn format_path(path: &[PathStep]) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Why a schema lookup stopped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavError {
    /// The pointer does not start with `#/`.
    #[error("cannot resolve external reference: {0}")]
    ExternalRef(String),

    /// A pointer segment does not exist in the document.
    #[error("failed to resolve reference part '{part}' at path {pointer}")]
    BrokenRef { pointer: String, part: String },

    /// No property matches the field name or its display alias.
    #[error(
        "could not find schema property for field '{field}' (tried alias '{alias}') at path {prefix}. Available keys: {available:?}"
    )]
    MissingProperty {
        field: String,
        alias: String,
        /// The path up to and including the unresolved step.
        prefix: String,
        /// Keys that do exist at this level.
        available: Vec<String>,
    },

    /// An index step hit a list that is too short.
    #[error("index {index} out of bounds for schema list at path {prefix}")]
    IndexOutOfBounds { index: usize, prefix: String },

    /// An index step hit a node that has no `items`.
    #[error(
        "schema is not an array type with 'items', cannot navigate by index {index} at path {prefix}. Available keys: {available:?}"
    )]
    NotAnArray {
        index: usize,
        prefix: String,
        available: Vec<String>,
    },
}

impl NavError {
    /// The `{"error": "..."}` object handed to feedback in place of a snippet.
    pub fn to_value(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// Resolve a same-document `$ref` pointer such as `#/$defs/LVAssessment`.
pub fn resolve_ref<'a>(schema: &'a Value, pointer: &str) -> Result<&'a Value, NavError> {
    let Some(rest) = pointer.strip_prefix("#/") else {
        return Err(NavError::ExternalRef(pointer.to_string()));
    };

    let mut current = schema;
    for raw in rest.split('/') {
        let part = raw.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Object(map) => map.get(&part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| NavError::BrokenRef {
            pointer: pointer.to_string(),
            part: part.clone(),
        })?;
    }
    Ok(current)
}

/// Follow a chain of `$ref`s on `node` itself (not its children), taking at
/// most `max_hops` hops.
pub(crate) fn deref<'a>(
    node: &'a Value,
    schema: &'a Value,
    max_hops: usize,
) -> Result<&'a Value, NavError> {
    let mut current = node;
    for _ in 0..max_hops {
        match current.get("$ref").and_then(Value::as_str) {
            Some(pointer) => current = resolve_ref(schema, pointer)?,
            None => break,
        }
    }
    Ok(current)
}

/// Return a copy of `snippet` with every `$ref` replaced by its target.
///
/// `max_depth` bounds the number of `$ref` hops along any one expansion
/// path. A `$ref` that would exceed it is left in place, which guarantees
/// termination on cyclic schemas. A `$ref` that cannot be resolved is kept
/// and annotated with a `$ref_error` message.
pub fn resolve_deep(snippet: &Value, schema: &Value, max_depth: usize) -> Value {
    match snippet {
        Value::Object(map) => {
            if let Some(pointer) = map.get("$ref").and_then(Value::as_str) {
                if max_depth == 0 {
                    return snippet.clone();
                }
                return match resolve_ref(schema, pointer) {
                    Ok(target) => resolve_deep(target, schema, max_depth - 1),
                    Err(e) => {
                        let mut annotated = map.clone();
                        annotated.insert("$ref_error".to_string(), Value::String(e.to_string()));
                        Value::Object(annotated)
                    }
                };
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), resolve_deep(v, schema, max_depth)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_deep(v, schema, max_depth))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Human-readable alias for a field name: `left_ventricle` -> `Left Ventricle`.
///
/// Letters that follow another letter are lowercased and all others are
/// uppercased, so `lv_ef_4ch` becomes `Lv Ef 4Ch`.
pub fn display_alias(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut prev_alpha = false;
    for ch in spaced.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keys offered back to the caller when a step fails: the declared
/// properties if there are any, otherwise the node's own keys.
fn available_keys(node: &Value) -> Vec<String> {
    let source = node
        .get("properties")
        .and_then(Value::as_object)
        .or_else(|| node.as_object());
    source
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

/// Find the sub-schema that governs `path`.
///
/// Key steps match a `properties` entry exactly, then by [`display_alias`].
/// Index steps descend into `items`, or index the node directly when the
/// node is itself a list. `$ref`s met along the way are followed.
pub fn locate<'a>(schema: &'a Value, path: &[PathStep]) -> Result<&'a Value, NavError> {
    let mut current = schema;

    for (i, step) in path.iter().enumerate() {
        current = deref(current, schema, MAX_REF_HOPS)?;
        let prefix = || format_path(&path[..=i]);

        current = match step {
            PathStep::Key(field) => {
                let props = current.get("properties").and_then(Value::as_object);
                let alias = display_alias(field);
                match props.and_then(|p| p.get(field).or_else(|| p.get(&alias))) {
                    Some(found) => found,
                    None => {
                        debug!(field = %field, prefix = %prefix(), "schema property not found");
                        return Err(NavError::MissingProperty {
                            field: field.clone(),
                            alias,
                            prefix: prefix(),
                            available: available_keys(current),
                        });
                    }
                }
            }
            PathStep::Index(index) => {
                if let Some(items) = current.get("items") {
                    items
                } else if let Value::Array(list) = current {
                    list.get(*index).ok_or_else(|| NavError::IndexOutOfBounds {
                        index: *index,
                        prefix: prefix(),
                    })?
                } else {
                    return Err(NavError::NotAnArray {
                        index: *index,
                        prefix: prefix(),
                        available: available_keys(current),
                    });
                }
            }
        };
    }

    Ok(current)
}

/// [`locate`] followed by [`resolve_deep`]: the snippet feedback receives.
pub fn snippet_for(schema: &Value, path: &[PathStep], max_depth: usize) -> Result<Value, NavError> {
    locate(schema, path).map(|node| resolve_deep(node, schema, max_depth))
}
