//! Compile JSON Schema text (a strict draft 2020-12 subset) into `SchemaNode`s.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value as JsonValue};

use super::SchemaError;
use super::types::{AdditionalProperties, JsonType, SchemaNode};

const DEFS_REF_PREFIX: &str = "#/$defs/";

/// Keywords that carry no validation meaning and are skipped.
const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "title",
    "description",
    "examples",
    "default",
];

/// Compiled root plus named definitions.
pub struct CompiledDocument {
    pub root: SchemaNode,
    pub defs: BTreeMap<String, SchemaNode>,
}

pub fn compile_document(source: &str) -> Result<CompiledDocument, SchemaError> {
    let doc: JsonValue = serde_json::from_str(source)?;
    let JsonValue::Object(mut top) = doc else {
        return Err(compile_err("#", "root schema must be an object"));
    };

    let mut defs = BTreeMap::new();
    match top.remove("$defs") {
        Some(JsonValue::Object(raw_defs)) => {
            for (name, def) in raw_defs {
                let location = format!("{DEFS_REF_PREFIX}{name}");
                let node = compile_node(&def, &location)?;
                defs.insert(name, node);
            }
        }
        Some(_) => return Err(compile_err("#/$defs", "must be an object")),
        None => {}
    }
    let root = compile_object(&top, "#")?;

    check_refs(&root, "#", &defs)?;
    for (name, def) in &defs {
        check_refs(def, &format!("{DEFS_REF_PREFIX}{name}"), &defs)?;
    }
    Ok(CompiledDocument { root, defs })
}

fn compile_node(value: &JsonValue, location: &str) -> Result<SchemaNode, SchemaError> {
    match value {
        JsonValue::Bool(true) => Ok(SchemaNode::default()),
        JsonValue::Object(map) => compile_object(map, location),
        _ => Err(compile_err(location, "schema must be an object or `true`")),
    }
}

fn compile_object(
    map: &JsonMap<String, JsonValue>,
    location: &str,
) -> Result<SchemaNode, SchemaError> {
    let mut node = SchemaNode::default();
    for (key, value) in map {
        let at = format!("{location}/{key}");
        match key.as_str() {
            k if ANNOTATIONS.contains(&k) => {}
            "$defs" => return Err(compile_err(&at, "nested $defs are not supported")),
            "$ref" => {
                let target = value
                    .as_str()
                    .and_then(|s| s.strip_prefix(DEFS_REF_PREFIX))
                    .filter(|name| !name.is_empty() && !name.contains('/'))
                    .ok_or_else(|| {
                        compile_err(&at, "only local `#/$defs/<name>` references are supported")
                    })?;
                node.reference = Some(target.to_string());
            }
            "type" => node.types = Some(parse_types(value, &at)?),
            "enum" => {
                if node.allowed.is_some() {
                    return Err(compile_err(&at, "`enum` and `const` are mutually exclusive"));
                }
                match value {
                    JsonValue::Array(items) if !items.is_empty() => {
                        node.allowed = Some(items.clone())
                    }
                    _ => return Err(compile_err(&at, "must be a non-empty array")),
                }
            }
            "const" => {
                if node.allowed.is_some() {
                    return Err(compile_err(&at, "`enum` and `const` are mutually exclusive"));
                }
                node.allowed = Some(vec![value.clone()]);
            }
            "minLength" => node.min_length = Some(parse_count(value, &at)?),
            "maxLength" => node.max_length = Some(parse_count(value, &at)?),
            "minItems" => node.min_items = Some(parse_count(value, &at)?),
            "maxItems" => node.max_items = Some(parse_count(value, &at)?),
            "minimum" => node.minimum = Some(parse_bound(value, &at)?),
            "maximum" => node.maximum = Some(parse_bound(value, &at)?),
            "items" => node.items = Some(Box::new(compile_node(value, &at)?)),
            "properties" => {
                let JsonValue::Object(props) = value else {
                    return Err(compile_err(&at, "must be an object"));
                };
                for (name, prop) in props {
                    let prop_at = format!("{at}/{name}");
                    node.properties
                        .insert(name.clone(), compile_node(prop, &prop_at)?);
                }
            }
            "required" => {
                let names = value
                    .as_array()
                    .and_then(|items| {
                        items
                            .iter()
                            .map(|v| v.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                    })
                    .ok_or_else(|| compile_err(&at, "must be an array of strings"))?;
                node.required = names;
            }
            "additionalProperties" => {
                node.additional = match value {
                    JsonValue::Bool(true) => AdditionalProperties::Allowed,
                    JsonValue::Bool(false) => AdditionalProperties::Forbidden,
                    other => AdditionalProperties::Schema(Box::new(compile_node(other, &at)?)),
                };
            }
            other => {
                return Err(compile_err(
                    &at,
                    &format!("unsupported keyword '{other}'"),
                ));
            }
        }
    }
    Ok(node)
}

fn parse_types(value: &JsonValue, at: &str) -> Result<Vec<JsonType>, SchemaError> {
    let names: Vec<&str> = match value {
        JsonValue::String(s) => vec![s.as_str()],
        JsonValue::Array(items) if !items.is_empty() => items
            .iter()
            .map(|v| v.as_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| compile_err(at, "type names must be strings"))?,
        _ => return Err(compile_err(at, "must be a type name or non-empty array")),
    };
    names
        .into_iter()
        .map(|n| JsonType::parse(n).ok_or_else(|| compile_err(at, &format!("unknown type '{n}'"))))
        .collect()
}

fn parse_count(value: &JsonValue, at: &str) -> Result<usize, SchemaError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| compile_err(at, "must be a non-negative integer"))
}

fn parse_bound(value: &JsonValue, at: &str) -> Result<f64, SchemaError> {
    value
        .as_f64()
        .ok_or_else(|| compile_err(at, "must be a number"))
}

fn check_refs(
    node: &SchemaNode,
    location: &str,
    defs: &BTreeMap<String, SchemaNode>,
) -> Result<(), SchemaError> {
    if let Some(target) = &node.reference
        && !defs.contains_key(target)
    {
        return Err(compile_err(
            &format!("{location}/$ref"),
            &format!("unresolved reference '{DEFS_REF_PREFIX}{target}'"),
        ));
    }
    if let Some(items) = &node.items {
        check_refs(items, &format!("{location}/items"), defs)?;
    }
    for (name, prop) in &node.properties {
        check_refs(prop, &format!("{location}/properties/{name}"), defs)?;
    }
    if let AdditionalProperties::Schema(extra) = &node.additional {
        check_refs(extra, &format!("{location}/additionalProperties"), defs)?;
    }
    Ok(())
}

fn compile_err(location: &str, reason: &str) -> SchemaError {
    SchemaError::Compile {
        location: location.to_string(),
        reason: reason.to_string(),
    }
}
