//! YAML documents (`.yaml` / `.yml`).

use std::path::Path;

use serde_json::Value as JsonValue;

use super::{DocumentExtractor, DocumentFormat, ParseError, has_extension, strip_location};

pub struct YamlExtractor;

impl DocumentExtractor for YamlExtractor {
    const FORMAT: DocumentFormat = DocumentFormat::Yaml;

    fn supports(path: &Path) -> bool {
        has_extension(path, &["yaml", "yml"])
    }

    fn extract(filename: &str, text: &str) -> Result<JsonValue, ParseError> {
        serde_yaml::from_str(text).map_err(|e| {
            let location = e.location();
            ParseError {
                filename: filename.to_string(),
                format: Self::FORMAT,
                line: location.as_ref().map(|l| l.line()),
                column: location.as_ref().map(|l| l.column()),
                message: strip_location(&e.to_string()).to_string(),
            }
        })
    }
}
