//! Schema components and their declarative field trees.
//!
//! A [`SchemaComponent`] wraps one JSON Schema document and the
//! [`FieldTree`] derived from it. The tree is built once, up front, and is
//! what the key remapper and the validator walk; neither ever re-derives
//! structure from the raw document at extraction time.

pub mod navigator;
pub mod store;

pub use navigator::{
    format_path, locate, resolve_deep, resolve_ref, snippet_for, NavError, PathStep,
};
pub use store::SchemaStore;

use crate::error::{ExtractError, Result};
use navigator::{deref, MAX_REF_HOPS};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Nesting limit when building field trees; cyclic `$ref`s stop here.
const MAX_TREE_DEPTH: usize = 16;

/// Sentinel used by numeric fields that declare no string default.
pub const NOT_MEASURED: &str = "Not Measured";

/// Default choice used by enum fields that declare none, when it is a member.
pub const NOT_ASSESSED: &str = "Not Assessed";

/// Structural kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Object,
    List,
}

/// JSON type a scalar field declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Number,
    Integer,
    Boolean,
    Any,
}

/// Constraints read from a field's schema node.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub scalar_type: Option<ScalarType>,
    /// Closed set of permitted values (`enum`).
    pub choices: Option<Vec<Value>>,
    pub default: Option<Value>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Listed in the parent's `required` array.
    pub required: bool,
    pub description: Option<String>,
    /// String constants accepted alongside numbers (`anyOf` with `const`).
    pub literals: Vec<Value>,
}

/// How the validator treats a scalar leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafClass {
    /// Numeric value or a sentinel, optionally bounded.
    Measurement {
        sentinel: Value,
        minimum: Option<f64>,
        maximum: Option<f64>,
        /// Declared `integer`: fractional values are violations.
        integer: bool,
    },
    /// One of a closed set of choices.
    Choice {
        choices: Vec<Value>,
        default: Option<Value>,
    },
    /// Anything else; only the JSON type is checked.
    Free(ScalarType),
}

impl Constraints {
    /// Classify the leaf for validation.
    pub fn leaf_class(&self) -> LeafClass {
        if let Some(choices) = &self.choices {
            let default = self.default.clone().or_else(|| {
                let fallback = Value::String(NOT_ASSESSED.to_string());
                choices.contains(&fallback).then_some(fallback)
            });
            return LeafClass::Choice {
                choices: choices.clone(),
                default,
            };
        }

        let numeric = matches!(
            self.scalar_type,
            Some(ScalarType::Number) | Some(ScalarType::Integer)
        ) || self.minimum.is_some()
            || self.maximum.is_some();

        if numeric {
            let sentinel = match &self.default {
                Some(Value::String(s)) => Value::String(s.clone()),
                _ => self
                    .literals
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Value::String(NOT_MEASURED.to_string())),
            };
            return LeafClass::Measurement {
                sentinel,
                minimum: self.minimum,
                maximum: self.maximum,
                integer: self.scalar_type == Some(ScalarType::Integer),
            };
        }

        LeafClass::Free(self.scalar_type.unwrap_or(ScalarType::Any))
    }
}

/// One named field in a [`FieldTree`].
#[derive(Debug, Clone)]
pub struct FieldNode {
    pub name: String,
    pub kind: FieldKind,
    /// Field tree of a nested object, or of the items of a list of objects.
    pub children: Option<Arc<FieldTree>>,
    /// Item field of a list whose items are not objects (scalars, nested lists).
    pub item: Option<Arc<FieldNode>>,
    pub constraints: Constraints,
}

impl FieldNode {
    /// The value used when the field is absent from the oracle output.
    pub fn default_value(&self) -> Value {
        match self.kind {
            FieldKind::Object => match (&self.constraints.default, &self.children) {
                (Some(d), _) => d.clone(),
                (None, Some(children)) => children.default_object(),
                (None, None) => Value::Object(Map::new()),
            },
            FieldKind::List => self
                .constraints
                .default
                .clone()
                .unwrap_or_else(|| Value::Array(Vec::new())),
            FieldKind::Scalar => match self.constraints.leaf_class() {
                LeafClass::Measurement { sentinel, .. } => sentinel,
                LeafClass::Choice { default, .. } => default.unwrap_or(Value::Null),
                LeafClass::Free(_) => self.constraints.default.clone().unwrap_or(Value::Null),
            },
        }
    }

    /// Whether an absent value can be filled in without a validation error.
    ///
    /// Objects and lists qualify only through a declared `default`; a
    /// required nested object that is absent is an error even when its own
    /// fields could all be defaulted.
    pub fn has_default(&self) -> bool {
        if self.constraints.default.is_some() {
            return true;
        }
        match self.kind {
            FieldKind::Object | FieldKind::List => false,
            FieldKind::Scalar => match self.constraints.leaf_class() {
                LeafClass::Measurement { .. } => true,
                LeafClass::Choice { default, .. } => default.is_some(),
                LeafClass::Free(_) => false,
            },
        }
    }
}

/// Ordered set of fields at one nesting level, in schema declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldTree {
    nodes: Vec<FieldNode>,
}

impl FieldTree {
    pub fn new(nodes: Vec<FieldNode>) -> Self {
        Self { nodes }
    }

    pub fn get(&self, name: &str) -> Option<&FieldNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldNode> {
        self.nodes.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// An object holding every field's default, in declaration order.
    pub fn default_object(&self) -> Value {
        Value::Object(
            self.nodes
                .iter()
                .map(|n| (n.name.clone(), n.default_value()))
                .collect(),
        )
    }

    /// Build the tree for the object schema `node` inside `document`.
    pub fn from_schema(node: &Value, document: &Value) -> Self {
        build_tree(node, document, 0)
    }
}

fn build_tree(node: &Value, document: &Value, depth: usize) -> FieldTree {
    let node = deref(node, document, MAX_REF_HOPS).unwrap_or(node);
    let Some(properties) = node.get("properties").and_then(Value::as_object) else {
        return FieldTree::default();
    };
    let required: Vec<&str> = node
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let nodes = properties
        .iter()
        .map(|(name, prop)| build_node(name, prop, required.contains(&name.as_str()), document, depth))
        .collect();
    FieldTree::new(nodes)
}

/// The schema nodes describing one field: the declaring node first, then its
/// `$ref` target, then any `anyOf`/`oneOf`/`allOf` branches (each dereferenced).
fn facets<'a>(prop: &'a Value, document: &'a Value) -> Vec<&'a Value> {
    let mut out = vec![prop];
    if let Ok(target) = deref(prop, document, MAX_REF_HOPS) {
        if !std::ptr::eq(target, prop) {
            out.push(target);
        }
    }
    let mut branches = Vec::new();
    for facet in out.clone() {
        for key in ["anyOf", "oneOf", "allOf"] {
            if let Some(list) = facet.get(key).and_then(Value::as_array) {
                for branch in list {
                    branches.push(deref(branch, document, MAX_REF_HOPS).unwrap_or(branch));
                }
            }
        }
    }
    out.extend(branches);
    out
}

fn type_names(facet: &Value) -> Vec<&str> {
    match facet.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn build_node(name: &str, prop: &Value, required: bool, document: &Value, depth: usize) -> FieldNode {
    let facets = facets(prop, document);
    let first = |key: &str| facets.iter().find_map(|f| f.get(key));
    let types: Vec<&str> = facets.iter().flat_map(|f| type_names(f)).collect();

    let object_facet = facets
        .iter()
        .find(|f| f.get("properties").is_some())
        .copied();
    let items = first("items").map(|i| deref(i, document, MAX_REF_HOPS).unwrap_or(i));

    let (kind, child_source, item_source) = if types.contains(&"array") || items.is_some() {
        match items {
            Some(i) if i.get("properties").is_some() => (FieldKind::List, Some(i), None),
            other => (FieldKind::List, None, other),
        }
    } else if object_facet.is_some() || types.contains(&"object") {
        (FieldKind::Object, object_facet, None)
    } else {
        (FieldKind::Scalar, None, None)
    };

    let (children, item) = if depth < MAX_TREE_DEPTH {
        (
            child_source.map(|source| Arc::new(build_tree(source, document, depth + 1))),
            item_source.map(|source| Arc::new(build_node(name, source, false, document, depth + 1))),
        )
    } else {
        (None, None)
    };

    let scalar_type = if types.contains(&"number") {
        Some(ScalarType::Number)
    } else if types.contains(&"integer") {
        Some(ScalarType::Integer)
    } else if types.contains(&"boolean") {
        Some(ScalarType::Boolean)
    } else if types.contains(&"string") {
        Some(ScalarType::String)
    } else {
        None
    };

    let literals = facets
        .iter()
        .filter_map(|f| f.get("const"))
        .filter(|c| c.is_string())
        .cloned()
        .collect();

    let constraints = Constraints {
        scalar_type,
        choices: first("enum").and_then(Value::as_array).cloned(),
        default: first("default").cloned(),
        minimum: first("minimum").and_then(Value::as_f64),
        maximum: first("maximum").and_then(Value::as_f64),
        required,
        description: first("description").and_then(Value::as_str).map(str::to_string),
        literals,
    };

    FieldNode {
        name: name.to_string(),
        kind,
        children,
        item,
        constraints,
    }
}

/// One extraction target: a named schema document and its field tree.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SchemaComponent {
    name: String,
    document: Value,
    fields: Arc<FieldTree>,
}

impl SchemaComponent {
    /// Build a component from a parsed schema document.
    ///
    /// The document root must be an object schema declaring `properties`.
    pub fn from_document(name: impl Into<String>, document: Value) -> Result<Self> {
        let name = name.into();
        if !document.is_object() {
            return Err(ExtractError::setup(&name, "schema document is not a JSON object"));
        }
        let root = deref(&document, &document, MAX_REF_HOPS)
            .map_err(|e| ExtractError::setup(&name, e.to_string()))?;
        if root.get("properties").and_then(Value::as_object).is_none() {
            return Err(ExtractError::setup(&name, "schema document declares no properties"));
        }
        let fields = Arc::new(FieldTree::from_schema(&document, &document));
        Ok(Self {
            name,
            document,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw schema document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn fields(&self) -> &FieldTree {
        &self.fields
    }

    /// Pretty-printed document, as embedded in the extraction prompt.
    pub fn schema_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    /// A record with every field at its default; substituted when
    /// extraction for this component is exhausted.
    pub fn default_record(&self) -> Value {
        self.fields.default_object()
    }
}
