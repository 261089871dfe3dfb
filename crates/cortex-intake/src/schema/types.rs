use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// Primitive JSON types a `type` keyword may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl JsonType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }

    /// The most specific type name for a value. Numbers without a fractional
    /// representation report `integer`.
    pub fn of(value: &JsonValue) -> Self {
        match value {
            JsonValue::Object(_) => Self::Object,
            JsonValue::Array(_) => Self::Array,
            JsonValue::String(_) => Self::String,
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            JsonValue::Number(_) => Self::Number,
            JsonValue::Bool(_) => Self::Boolean,
            JsonValue::Null => Self::Null,
        }
    }

    /// Whether a value of type `actual` satisfies a declared `self`.
    pub fn admits(self, actual: JsonType) -> bool {
        self == actual || (self == Self::Number && actual == Self::Integer)
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for object members not listed under `properties`.
#[derive(Debug, Clone, Default)]
pub enum AdditionalProperties {
    #[default]
    Allowed,
    Forbidden,
    Schema(Box<SchemaNode>),
}

/// One compiled schema node. Keywords compose: every keyword present must hold.
#[derive(Debug, Clone, Default)]
pub struct SchemaNode {
    /// Local reference into `$defs`, stored as the definition name.
    pub reference: Option<String>,
    pub types: Option<Vec<JsonType>>,
    pub allowed: Option<Vec<JsonValue>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub items: Option<Box<SchemaNode>>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub properties: BTreeMap<String, SchemaNode>,
    /// Required member names, in declaration order.
    pub required: Vec<String>,
    pub additional: AdditionalProperties,
}
