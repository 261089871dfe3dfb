//! Unification of a raw value tree with a compiled sub-schema.
//!
//! Every violation found is collected; unification never stops at the first.

mod path;

pub use path::FieldPath;

use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::schema::{AdditionalProperties, JsonType, SchemaNode, SchemaStore, SubSchema};

/// A raw value that satisfied every constraint of the schema it was unified with.
///
/// Only `unify` constructs this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated(JsonValue);

impl Validated {
    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    MissingField,
    UnknownField,
    TypeMismatch,
    NotAllowed,
    TooShort,
    TooLong,
    TooFew,
    TooMany,
    OutOfRange,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::UnknownField => "unknown_field",
            Self::TypeMismatch => "type_mismatch",
            Self::NotAllowed => "not_allowed",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::TooFew => "too_few",
            Self::TooMany => "too_many",
            Self::OutOfRange => "out_of_range",
        }
    }
}

/// One constraint violation at a location in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: FieldPath,
    pub kind: ViolationKind,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} validation error(s) against {schema}{}", .violations.len(), first_violation(.violations))]
pub struct ValidationError {
    pub schema: String,
    pub violations: Vec<Violation>,
}

fn first_violation(violations: &[Violation]) -> String {
    match violations.first() {
        Some(v) if violations.len() == 1 => format!(": {v}"),
        Some(v) => format!(": {v} (and {} more)", violations.len() - 1),
        None => String::new(),
    }
}

/// Unify `value` with `schema`, yielding a `Validated` value or every violation found.
pub fn unify(schema: &SubSchema, value: JsonValue) -> Result<Validated, ValidationError> {
    let violations = check(schema, &value);
    if violations.is_empty() {
        Ok(Validated(value))
    } else {
        tracing::debug!(
            "{} violation(s) against {}",
            violations.len(),
            schema.path()
        );
        Err(ValidationError {
            schema: schema.path().to_string(),
            violations,
        })
    }
}

/// Collect violations without consuming the value.
pub fn check(schema: &SubSchema, value: &JsonValue) -> Vec<Violation> {
    let mut walker = Walker {
        store: schema.store(),
        out: Vec::new(),
    };
    walker.visit(schema.node(), value, &mut FieldPath::root(), 0);
    walker.out
}

struct Walker<'s> {
    store: &'s SchemaStore,
    out: Vec<Violation>,
}

impl Walker<'_> {
    fn push(&mut self, path: &FieldPath, kind: ViolationKind, message: String) {
        self.out.push(Violation {
            path: path.clone(),
            kind,
            message,
        });
    }

    /// `ref_hops` counts references followed without descending into the value,
    /// which bounds reference cycles.
    fn visit(&mut self, node: &SchemaNode, value: &JsonValue, path: &mut FieldPath, ref_hops: usize) {
        if let Some(target) = &node.reference {
            match self.store.definition(target) {
                Some(def) if ref_hops <= self.store.definition_names().count() => {
                    self.visit(def, value, path, ref_hops + 1);
                }
                _ => {
                    tracing::warn!("unresolvable reference '{}' at {}", target, path);
                }
            }
        }

        let actual = JsonType::of(value);
        if let Some(types) = &node.types
            && !types.iter().any(|t| t.admits(actual))
        {
            let expected = types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(" or ");
            self.push(
                path,
                ViolationKind::TypeMismatch,
                format!("expected {expected}, found {actual}"),
            );
            return;
        }

        if let Some(allowed) = &node.allowed
            && !allowed.contains(value)
        {
            let listed = allowed
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let message = if allowed.len() == 1 {
                format!("must be {listed}, found {value}")
            } else {
                format!("must be one of [{listed}], found {value}")
            };
            self.push(path, ViolationKind::NotAllowed, message);
        }

        match value {
            JsonValue::String(s) => self.visit_string(node, s, path),
            JsonValue::Number(n) => {
                if let Some(x) = n.as_f64() {
                    self.visit_number(node, x, path);
                }
            }
            JsonValue::Array(items) => self.visit_array(node, items, path),
            JsonValue::Object(map) => self.visit_object(node, map, path),
            JsonValue::Bool(_) | JsonValue::Null => {}
        }
    }

    fn visit_string(&mut self, node: &SchemaNode, s: &str, path: &FieldPath) {
        let len = s.chars().count();
        if let Some(min) = node.min_length
            && len < min
        {
            let message = if min == 1 {
                "must not be empty".to_string()
            } else {
                format!("must be at least {min} characters, found {len}")
            };
            self.push(path, ViolationKind::TooShort, message);
        }
        if let Some(max) = node.max_length
            && len > max
        {
            self.push(
                path,
                ViolationKind::TooLong,
                format!("must be at most {max} characters, found {len}"),
            );
        }
    }

    fn visit_number(&mut self, node: &SchemaNode, x: f64, path: &FieldPath) {
        if let Some(min) = node.minimum
            && x < min
        {
            self.push(path, ViolationKind::OutOfRange, format!("must be >= {min}, found {x}"));
        }
        if let Some(max) = node.maximum
            && x > max
        {
            self.push(path, ViolationKind::OutOfRange, format!("must be <= {max}, found {x}"));
        }
    }

    fn visit_array(&mut self, node: &SchemaNode, items: &[JsonValue], path: &mut FieldPath) {
        if let Some(min) = node.min_items
            && items.len() < min
        {
            self.push(
                path,
                ViolationKind::TooFew,
                format!("must contain at least {min} item(s), found {}", items.len()),
            );
        }
        if let Some(max) = node.max_items
            && items.len() > max
        {
            self.push(
                path,
                ViolationKind::TooMany,
                format!("must contain at most {max} item(s), found {}", items.len()),
            );
        }
        if let Some(item_schema) = &node.items {
            for (idx, item) in items.iter().enumerate() {
                path.push_index(idx);
                self.visit(item_schema, item, path, 0);
                path.pop();
            }
        }
    }

    fn visit_object(
        &mut self,
        node: &SchemaNode,
        map: &serde_json::Map<String, JsonValue>,
        path: &mut FieldPath,
    ) {
        for name in &node.required {
            if !map.contains_key(name) {
                path.push_field(name);
                self.push(path, ViolationKind::MissingField, "field is required".to_string());
                path.pop();
            }
        }
        // Members in key order, whatever order the map keeps them in.
        let mut members: Vec<(&String, &JsonValue)> = map.iter().collect();
        members.sort_by(|a, b| a.0.cmp(b.0));
        for (key, member) in members {
            path.push_field(key);
            if let Some(prop) = node.properties.get(key) {
                self.visit(prop, member, path, 0);
            } else {
                match &node.additional {
                    AdditionalProperties::Allowed => {}
                    AdditionalProperties::Forbidden => self.push(
                        path,
                        ViolationKind::UnknownField,
                        "field is not allowed".to_string(),
                    ),
                    AdditionalProperties::Schema(extra) => self.visit(extra, member, path, 0),
                }
            }
            path.pop();
        }
    }
}
