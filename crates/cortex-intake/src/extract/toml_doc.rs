//! TOML documents (`.toml`).

use std::path::Path;

use serde_json::Value as JsonValue;

use super::{DocumentExtractor, DocumentFormat, ParseError, has_extension, line_col};

pub struct TomlExtractor;

impl DocumentExtractor for TomlExtractor {
    const FORMAT: DocumentFormat = DocumentFormat::Toml;

    fn supports(path: &Path) -> bool {
        has_extension(path, &["toml"])
    }

    fn extract(filename: &str, text: &str) -> Result<JsonValue, ParseError> {
        toml::from_str(text).map_err(|e| {
            let position = e.span().map(|span| line_col(text.as_bytes(), span.start));
            ParseError {
                filename: filename.to_string(),
                format: Self::FORMAT,
                line: position.map(|(l, _)| l),
                column: position.map(|(_, c)| c),
                message: e.message().to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_and_arrays_of_tables() {
        let v = TomlExtractor::extract(
            "a.toml",
            "name = \"a\"\n[[tool_resources]]\nname = \"search\"\nsearch_service = \"docs\"\n",
        )
        .expect("ok");
        assert_eq!(v["tool_resources"][0]["search_service"], "docs");
    }

    #[test]
    fn duplicate_key_reports_span_position() {
        let err = TomlExtractor::extract("a.toml", "name = \"a\"\nname = \"b\"\n")
            .err()
            .expect("must fail");
        assert_eq!(err.format, DocumentFormat::Toml);
        assert_eq!(err.line, Some(2));
    }
}
