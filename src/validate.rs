//! Field-level validation with a degrade-in-place policy.
//!
//! The validator walks a remapped value against a component's
//! [`FieldTree`] and produces either a cleaned record (fields in schema
//! order, unknown keys dropped, absent fields defaulted) or the list of
//! [`FieldError`]s that make it unusable.
//!
//! Leaf violations are handled per field kind by [`ValidationPolicy`]:
//! with [`ViolationPolicy::Degrade`] a bad measurement is reset to its
//! sentinel and a bad choice to its default, touching only that field.
//! Structural problems (wrong container type, missing required field)
//! always fail.

use crate::schema::{
    format_path, navigator::FEEDBACK_SNIPPET_DEPTH, snippet_for, FieldKind, FieldNode, FieldTree,
    LeafClass, NavError, PathStep, ScalarType, SchemaComponent,
};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::debug;

/// What to do when a leaf value breaks its constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Replace the value with the field's sentinel/default and carry on.
    #[default]
    Degrade,
    /// Report a [`FieldError`].
    Reject,
}

/// One [`ViolationPolicy`] per leaf kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationPolicy {
    /// Numeric fields with a sentinel ("Not Measured").
    pub measurement: ViolationPolicy,
    /// Enum fields.
    pub choice: ViolationPolicy,
}

impl ValidationPolicy {
    /// Reject every leaf violation.
    pub fn strict() -> Self {
        Self {
            measurement: ViolationPolicy::Reject,
            choice: ViolationPolicy::Reject,
        }
    }
}

/// Category of a [`FieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    ObjectType,
    ListType,
    TypeMismatch,
    OutOfRange,
    NotNumeric,
    NotInteger,
    InvalidChoice,
}

impl FieldErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldErrorKind::Missing => "missing",
            FieldErrorKind::ObjectType => "object_type",
            FieldErrorKind::ListType => "list_type",
            FieldErrorKind::TypeMismatch => "type_mismatch",
            FieldErrorKind::OutOfRange => "out_of_range",
            FieldErrorKind::NotNumeric => "not_numeric",
            FieldErrorKind::NotInteger => "not_integer",
            FieldErrorKind::InvalidChoice => "invalid_choice",
        }
    }
}

/// A validation failure at one location of the record.
#[derive(Debug, Clone)]
pub struct FieldError {
    pub path: Vec<PathStep>,
    pub message: String,
    pub kind: FieldErrorKind,
    /// The schema governing `path`, `$ref`s inlined, or why it could not be found.
    pub snippet: Result<Value, NavError>,
}

impl FieldError {
    pub fn path_string(&self) -> String {
        format_path(&self.path)
    }

    /// The snippet as JSON; a lookup failure becomes `{"error": ...}`.
    pub fn snippet_value(&self) -> Value {
        match &self.snippet {
            Ok(v) => v.clone(),
            Err(e) => e.to_value(),
        }
    }
}

/// A leaf value that was replaced under [`ViolationPolicy::Degrade`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub path: Vec<PathStep>,
    pub original: Value,
    pub replacement: Value,
    pub reason: String,
}

/// Output of a successful validation.
#[derive(Debug, Clone)]
pub struct Validated {
    pub value: Value,
    pub degradations: Vec<Degradation>,
}

#[derive(Default)]
struct Walk {
    errors: Vec<FieldError>,
    degradations: Vec<Degradation>,
}

/// Validates values against one [`SchemaComponent`].
pub struct Validator<'a> {
    component: &'a SchemaComponent,
    policy: ValidationPolicy,
    snippet_depth: usize,
}

impl<'a> Validator<'a> {
    pub fn new(component: &'a SchemaComponent, policy: ValidationPolicy) -> Self {
        Self {
            component,
            policy,
            snippet_depth: FEEDBACK_SNIPPET_DEPTH,
        }
    }

    /// `$ref` hop budget for the snippets attached to errors.
    pub fn with_snippet_depth(mut self, depth: usize) -> Self {
        self.snippet_depth = depth;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<Validated, Vec<FieldError>> {
        let mut walk = Walk::default();
        let mut path = Vec::new();

        let cleaned = match value {
            Value::Object(map) => self.object(self.component.fields(), map, &mut path, &mut walk),
            other => {
                walk.errors.push(self.error(
                    &path,
                    FieldErrorKind::ObjectType,
                    format!("expected a JSON object, got {}", type_name(other)),
                ));
                Value::Null
            }
        };

        if walk.errors.is_empty() {
            Ok(Validated {
                value: cleaned,
                degradations: walk.degradations,
            })
        } else {
            Err(walk.errors)
        }
    }

    fn error(&self, path: &[PathStep], kind: FieldErrorKind, message: String) -> FieldError {
        FieldError {
            path: path.to_vec(),
            message,
            kind,
            snippet: snippet_for(self.component.document(), path, self.snippet_depth),
        }
    }

    fn object(
        &self,
        tree: &FieldTree,
        map: &Map<String, Value>,
        path: &mut Vec<PathStep>,
        walk: &mut Walk,
    ) -> Value {
        let mut out = Map::with_capacity(tree.len());
        for node in tree.iter() {
            path.push(PathStep::Key(node.name.clone()));
            let value = match map.get(&node.name) {
                Some(v) => self.field(node, v, path, walk),
                None => {
                    if node.constraints.required && !node.has_default() {
                        walk.errors.push(self.error(
                            path,
                            FieldErrorKind::Missing,
                            "field required".to_string(),
                        ));
                    }
                    node.default_value()
                }
            };
            out.insert(node.name.clone(), value);
            path.pop();
        }

        for key in map.keys().filter(|k| tree.get(k).is_none()) {
            debug!(key = %key, path = %format_path(path), "dropping unknown key");
        }
        Value::Object(out)
    }

    fn field(
        &self,
        node: &FieldNode,
        value: &Value,
        path: &mut Vec<PathStep>,
        walk: &mut Walk,
    ) -> Value {
        match node.kind {
            FieldKind::Object => match (value, &node.children) {
                (Value::Object(map), Some(children)) => self.object(children, map, path, walk),
                (Value::Object(_), None) => value.clone(),
                _ => {
                    walk.errors.push(self.error(
                        path,
                        FieldErrorKind::ObjectType,
                        format!("expected an object, got {}", type_name(value)),
                    ));
                    value.clone()
                }
            },
            FieldKind::List => match value {
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        path.push(PathStep::Index(i));
                        out.push(self.list_item(node, item, path, walk));
                        path.pop();
                    }
                    Value::Array(out)
                }
                _ => {
                    walk.errors.push(self.error(
                        path,
                        FieldErrorKind::ListType,
                        format!("expected a list, got {}", type_name(value)),
                    ));
                    value.clone()
                }
            },
            FieldKind::Scalar => self.leaf(node, value, path, walk),
        }
    }

    /// One list element: an object against the item tree, anything else
    /// against the item field. Untyped items pass through.
    fn list_item(
        &self,
        node: &FieldNode,
        item: &Value,
        path: &mut Vec<PathStep>,
        walk: &mut Walk,
    ) -> Value {
        match (&node.children, &node.item) {
            (Some(children), _) => match item {
                Value::Object(map) => self.object(children, map, path, walk),
                other => {
                    walk.errors.push(self.error(
                        path,
                        FieldErrorKind::ObjectType,
                        format!("expected an object, got {}", type_name(other)),
                    ));
                    other.clone()
                }
            },
            (None, Some(item_node)) => self.field(item_node, item, path, walk),
            (None, None) => item.clone(),
        }
    }

    fn leaf(&self, node: &FieldNode, value: &Value, path: &[PathStep], walk: &mut Walk) -> Value {
        match node.constraints.leaf_class() {
            LeafClass::Measurement {
                sentinel,
                minimum,
                maximum,
                integer,
            } => {
                if *value == sentinel {
                    return value.clone();
                }
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                let (kind, message) = match number {
                    Some(x) if x.is_finite() && integer && x.fract() != 0.0 => (
                        FieldErrorKind::NotInteger,
                        format!("value {} must be a whole number or {}", x, sentinel),
                    ),
                    Some(x) if x.is_finite() && in_range(x, minimum, maximum) => {
                        return match value {
                            Value::Number(_) => value.clone(),
                            _ if integer => Value::from(x as i64),
                            _ => Number::from_f64(x).map(Value::Number).unwrap_or(sentinel),
                        };
                    }
                    Some(x) => (
                        FieldErrorKind::OutOfRange,
                        format!(
                            "value {} is outside the permitted range {}",
                            x,
                            range_text(minimum, maximum)
                        ),
                    ),
                    None => (
                        FieldErrorKind::NotNumeric,
                        format!("value {} must be a number or {}", value, sentinel),
                    ),
                };
                self.violation(self.policy.measurement, value, sentinel, kind, message, path, walk)
            }
            LeafClass::Choice { choices, default } => {
                if choices.contains(value) {
                    return value.clone();
                }
                let message = format!(
                    "value {} is not one of {}",
                    value,
                    Value::Array(choices.clone())
                );
                match default {
                    Some(d) => self.violation(
                        self.policy.choice,
                        value,
                        d,
                        FieldErrorKind::InvalidChoice,
                        message,
                        path,
                        walk,
                    ),
                    None => {
                        walk.errors
                            .push(self.error(path, FieldErrorKind::InvalidChoice, message));
                        value.clone()
                    }
                }
            }
            LeafClass::Free(expected) => {
                if !type_matches(expected, value) {
                    walk.errors.push(self.error(
                        path,
                        FieldErrorKind::TypeMismatch,
                        format!("expected {:?}, got {}", expected, type_name(value)).to_lowercase(),
                    ));
                }
                value.clone()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn violation(
        &self,
        policy: ViolationPolicy,
        value: &Value,
        replacement: Value,
        kind: FieldErrorKind,
        message: String,
        path: &[PathStep],
        walk: &mut Walk,
    ) -> Value {
        match policy {
            ViolationPolicy::Degrade => {
                debug!(
                    path = %format_path(path),
                    original = %value,
                    replacement = %replacement,
                    "degraded field to fallback"
                );
                walk.degradations.push(Degradation {
                    path: path.to_vec(),
                    original: value.clone(),
                    replacement: replacement.clone(),
                    reason: message,
                });
                replacement
            }
            ViolationPolicy::Reject => {
                walk.errors.push(self.error(path, kind, message));
                value.clone()
            }
        }
    }
}

fn in_range(x: f64, minimum: Option<f64>, maximum: Option<f64>) -> bool {
    minimum.map_or(true, |m| x >= m) && maximum.map_or(true, |m| x <= m)
}

fn range_text(minimum: Option<f64>, maximum: Option<f64>) -> String {
    let fmt = |b: Option<f64>| b.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    format!("[{}, {}]", fmt(minimum), fmt(maximum))
}

fn type_matches(expected: ScalarType, value: &Value) -> bool {
    match (expected, value) {
        (_, Value::Null) | (ScalarType::Any, _) => true,
        (ScalarType::String, Value::String(_)) => true,
        (ScalarType::Number, Value::Number(_)) => true,
        (ScalarType::Integer, Value::Number(n)) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        (ScalarType::Boolean, Value::Bool(_)) => true,
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pericardium_schema;
    use serde_json::json;

    fn component() -> SchemaComponent {
        SchemaComponent::from_document("Pericardium", pericardium_schema()).unwrap()
    }

    fn validate(value: Value, policy: ValidationPolicy) -> Result<Validated, Vec<FieldError>> {
        Validator::new(&component(), policy).validate(&value)
    }

    #[test]
    fn test_out_of_range_measurement_degrades_only_that_field() {
        let out = validate(
            json!({
                "assessment": {
                    "effusion_size": "Moderate",
                    "findings": [{"location": "apex", "score": 3}, {"location": "base", "score": 9}]
                },
                "measurements": {"thickness": 42}
            }),
            ValidationPolicy::default(),
        )
        .unwrap();

        assert_eq!(out.value["measurements"]["thickness"], "Not Measured");
        assert_eq!(out.value["assessment"]["effusion_size"], "Moderate");
        assert_eq!(out.value["assessment"]["findings"][0]["score"], 3);
        assert_eq!(out.value["assessment"]["findings"][1]["score"], "Not Measured");
        assert_eq!(out.value["assessment"]["findings"][1]["location"], "base");

        let paths: Vec<String> = out
            .degradations
            .iter()
            .map(|d| format_path(&d.path))
            .collect();
        assert_eq!(paths, vec!["assessment.findings.1.score", "measurements.thickness"]);
    }

    #[test]
    fn test_numeric_strings_are_accepted_and_garbage_degrades() {
        let out = validate(
            json!({"assessment": {}, "measurements": {"thickness": " 4.5 "}}),
            ValidationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.value["measurements"]["thickness"], json!(4.5));

        let out = validate(
            json!({"assessment": {}, "measurements": {"thickness": "thick"}}),
            ValidationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.value["measurements"]["thickness"], "Not Measured");
        assert_eq!(out.degradations[0].original, json!("thick"));
    }

    #[test]
    fn test_unknown_choice_resets_to_default() {
        let out = validate(
            json!({"assessment": {"effusion_size": "Mild", "comments": "small"}}),
            ValidationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.value["assessment"]["effusion_size"], "Not Assessed");
        assert_eq!(out.value["assessment"]["comments"], "small");
    }

    #[test]
    fn test_strict_policy_reports_errors_with_snippets() {
        let errors = validate(
            json!({"assessment": {"effusion_size": "Mild"}, "measurements": {"thickness": 11}}),
            ValidationPolicy::strict(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path_string(), "assessment.effusion_size");
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidChoice);
        assert_eq!(errors[1].kind, FieldErrorKind::OutOfRange);
        let snippet = errors[1].snippet.as_ref().unwrap();
        assert_eq!(snippet["maximum"], 10.0);
    }

    #[test]
    fn test_structural_errors_always_fail() {
        let errors = validate(
            json!({"assessment": "normal", "measurements": {"thickness": 2}}),
            ValidationPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, FieldErrorKind::ObjectType);
        assert!(errors[0].snippet.as_ref().unwrap()["properties"].is_object());

        let errors = validate(json!([1, 2]), ValidationPolicy::default()).unwrap_err();
        assert_eq!(errors[0].path, Vec::<PathStep>::new());
    }

    #[test]
    fn test_missing_fields_are_defaulted_and_unknown_keys_dropped() {
        let out = validate(
            json!({"measurements": {"thickness": 1.2}, "assessment": {"findings": []}, "extra": 1}),
            ValidationPolicy::default(),
        )
        .unwrap();
        let keys: Vec<&String> = out.value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["assessment", "measurements"]);
        assert_eq!(out.value["assessment"]["effusion_size"], "Not Assessed");
        assert!(out.value["assessment"]["comments"].is_null());
    }

    #[test]
    fn test_required_field_without_default_is_missing() {
        let doc = json!({
            "type": "object",
            "properties": {"summary": {"type": "string"}},
            "required": ["summary"]
        });
        let c = SchemaComponent::from_document("Summary", doc).unwrap();
        let errors = Validator::new(&c, ValidationPolicy::default())
            .validate(&json!({}))
            .unwrap_err();
        assert_eq!(errors[0].kind, FieldErrorKind::Missing);
        assert_eq!(errors[0].path_string(), "summary");
    }

    #[test]
    fn test_absent_required_object_is_missing() {
        let doc = json!({
            "type": "object",
            "properties": {
                "section": {
                    "type": "object",
                    "properties": {"summary": {"type": "string"}},
                    "required": ["summary"]
                }
            },
            "required": ["section"]
        });
        let c = SchemaComponent::from_document("Section", doc).unwrap();
        let validator = Validator::new(&c, ValidationPolicy::default());

        let absent = validator.validate(&json!({})).unwrap_err();
        assert_eq!(absent.len(), 1);
        assert_eq!(absent[0].kind, FieldErrorKind::Missing);
        assert_eq!(absent[0].path_string(), "section");

        let empty = validator.validate(&json!({"section": {}})).unwrap_err();
        assert_eq!(empty[0].path_string(), "section.summary");
        assert_eq!(empty[0].kind, FieldErrorKind::Missing);
    }

    #[test]
    fn test_absent_required_assessment_fails_even_when_children_default() {
        let errors = validate(json!({"measurements": {"thickness": 2}}), ValidationPolicy::strict())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path_string(), "assessment");
        assert_eq!(errors[0].kind, FieldErrorKind::Missing);
    }

    #[test]
    fn test_scalar_list_items_are_validated() {
        let doc = json!({
            "type": "object",
            "properties": {
                "views": {"type": "array", "items": {"enum": ["Apical", "Parasternal"]}},
                "gradients": {
                    "type": "array",
                    "items": {"type": "number", "minimum": 0, "maximum": 100}
                }
            }
        });
        let c = SchemaComponent::from_document("Study", doc).unwrap();

        let errors = Validator::new(&c, ValidationPolicy::strict())
            .validate(&json!({"views": ["Apical", "Banana", 42, {"x": 1}], "gradients": [12, 140]}))
            .unwrap_err();
        let found: Vec<(String, FieldErrorKind)> =
            errors.iter().map(|e| (e.path_string(), e.kind)).collect();
        assert_eq!(
            found,
            vec![
                ("views.1".to_string(), FieldErrorKind::InvalidChoice),
                ("views.2".to_string(), FieldErrorKind::InvalidChoice),
                ("views.3".to_string(), FieldErrorKind::InvalidChoice),
                ("gradients.1".to_string(), FieldErrorKind::OutOfRange),
            ]
        );
        assert_eq!(errors[0].snippet.as_ref().unwrap()["enum"][0], "Apical");

        let out = Validator::new(&c, ValidationPolicy::default())
            .validate(&json!({"views": ["Apical"], "gradients": ["12.5", 140]}))
            .unwrap();
        assert_eq!(out.value["gradients"], json!([12.5, "Not Measured"]));
        assert_eq!(format_path(&out.degradations[0].path), "gradients.1");
    }

    #[test]
    fn test_integer_measurements_reject_fractions() {
        let doc = json!({
            "type": "object",
            "properties": {"heart_rate": {"type": "integer", "minimum": 20, "maximum": 250}}
        });
        let c = SchemaComponent::from_document("Vitals", doc).unwrap();

        let errors = Validator::new(&c, ValidationPolicy::strict())
            .validate(&json!({"heart_rate": 72.5}))
            .unwrap_err();
        assert_eq!(errors[0].kind, FieldErrorKind::NotInteger);
        let errors = Validator::new(&c, ValidationPolicy::strict())
            .validate(&json!({"heart_rate": "72.5"}))
            .unwrap_err();
        assert_eq!(errors[0].kind, FieldErrorKind::NotInteger);

        let out = Validator::new(&c, ValidationPolicy::default())
            .validate(&json!({"heart_rate": " 72 "}))
            .unwrap();
        assert_eq!(out.value["heart_rate"], json!(72));
        let out = Validator::new(&c, ValidationPolicy::default())
            .validate(&json!({"heart_rate": 72.5}))
            .unwrap();
        assert_eq!(out.value["heart_rate"], "Not Measured");
    }

    #[test]
    fn test_free_fields_are_type_checked() {
        let errors = validate(
            json!({"assessment": {"comments": 12}}),
            ValidationPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(errors[0].kind, FieldErrorKind::TypeMismatch);
        assert_eq!(errors[0].message, "expected string, got a number");
    }
}
