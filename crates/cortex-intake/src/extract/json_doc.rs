//! JSON documents (`.json`, and the fallback for unknown extensions).

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value as JsonValue};

use super::{DocumentExtractor, DocumentFormat, ParseError, has_extension, strip_location};

pub struct JsonExtractor;

impl DocumentExtractor for JsonExtractor {
    const FORMAT: DocumentFormat = DocumentFormat::Json;

    fn supports(path: &Path) -> bool {
        has_extension(path, &["json"])
    }

    fn extract(filename: &str, text: &str) -> Result<JsonValue, ParseError> {
        serde_json::from_str::<UniqueKeys>(text).map(|v| v.0).map_err(|e| {
            // serde_json reports 0 when it has no position (I/O errors only).
            let line = (e.line() > 0).then_some(e.line());
            let column = (e.column() > 0).then_some(e.column());
            ParseError {
                filename: filename.to_string(),
                format: Self::FORMAT,
                line,
                column,
                message: strip_location(&e.to_string()).to_string(),
            }
        })
    }
}

/// A JSON value whose objects never repeat a key.
///
/// `serde_json::Value` keeps the last of repeated keys; YAML and TOML reject
/// them, so JSON does too. serde_json attaches the position to the error.
struct UniqueKeys(JsonValue);

impl<'de> Deserialize<'de> for UniqueKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UniqueKeysVisitor).map(UniqueKeys)
    }
}

struct UniqueKeysVisitor;

impl<'de> Visitor<'de> for UniqueKeysVisitor {
    type Value = JsonValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<JsonValue, E> {
        Ok(JsonValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<JsonValue, E> {
        Ok(JsonValue::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<JsonValue, E> {
        Ok(JsonValue::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<JsonValue, E> {
        Ok(JsonValue::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<JsonValue, A::Error> {
        let mut items = Vec::new();
        while let Some(UniqueKeys(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(JsonValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<JsonValue, A::Error> {
        let mut map = Map::new();
        while let Some(key) = access.next_key::<String>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format_args!("duplicate key `{key}`")));
            }
            let UniqueKeys(value) = access.next_value()?;
            map.insert(key, value);
        }
        Ok(JsonValue::Object(map))
    }
}
