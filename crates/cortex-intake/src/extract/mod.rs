//! Raw document extraction: bytes in a self-describing format to a value tree.
//!
//! Each format declares a `supports` predicate over file paths and an
//! `extract` function producing a `serde_json::Value`. Nothing here knows
//! about the schema.

use std::fmt;
use std::path::Path;

use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod json_doc;
pub mod toml_doc;
pub mod yaml_doc;

use json_doc::JsonExtractor;
use toml_doc::TomlExtractor;
use yaml_doc::YamlExtractor;

/// Extractor implemented per input format.
pub trait DocumentExtractor {
    const FORMAT: DocumentFormat;
    fn supports(path: &Path) -> bool;
    fn extract(filename: &str, text: &str) -> Result<JsonValue, ParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Toml,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentFormat::Json => "JSON",
            DocumentFormat::Yaml => "YAML",
            DocumentFormat::Toml => "TOML",
        })
    }
}

impl DocumentFormat {
    /// Pick a format from the file extension; anything unrecognized is read as JSON.
    pub fn detect(path: &Path) -> Self {
        if YamlExtractor::supports(path) {
            DocumentFormat::Yaml
        } else if TomlExtractor::supports(path) {
            DocumentFormat::Toml
        } else {
            DocumentFormat::Json
        }
    }
}

/// True when the file extension names one of the supported formats.
pub fn is_supported(path: &Path) -> bool {
    JsonExtractor::supports(path) || YamlExtractor::supports(path) || TomlExtractor::supports(path)
}

/// Syntax error in an input document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{filename}{}: invalid {format}: {message}", position_suffix(.line, .column))]
pub struct ParseError {
    pub filename: String,
    pub format: DocumentFormat,
    /// 1-based line, when the parser reports one.
    pub line: Option<usize>,
    /// 1-based column, when the parser reports one.
    pub column: Option<usize>,
    pub message: String,
}

fn position_suffix(line: &Option<usize>, column: &Option<usize>) -> String {
    match (*line, *column) {
        (Some(l), Some(c)) => format!(":{l}:{c}"),
        (Some(l), None) => format!(":{l}"),
        _ => String::new(),
    }
}

/// Extract a raw value tree from a whole document.
pub fn extract(filename: &str, bytes: &[u8]) -> Result<JsonValue, ParseError> {
    let path = Path::new(filename);
    let format = DocumentFormat::detect(path);
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let (line, column) = line_col(bytes, e.valid_up_to());
        ParseError {
            filename: filename.to_string(),
            format,
            line: Some(line),
            column: Some(column),
            message: format!("invalid UTF-8: {e}"),
        }
    })?;
    tracing::debug!("extracting {} as {} ({} bytes)", filename, format, bytes.len());
    match format {
        DocumentFormat::Json => JsonExtractor::extract(filename, text),
        DocumentFormat::Yaml => YamlExtractor::extract(filename, text),
        DocumentFormat::Toml => TomlExtractor::extract(filename, text),
    }
}

/// 1-based line and column of a byte offset.
pub(crate) fn line_col(bytes: &[u8], offset: usize) -> (usize, usize) {
    let head = &bytes[..offset.min(bytes.len())];
    let line = head.iter().filter(|b| **b == b'\n').count() + 1;
    let column = match head.iter().rposition(|b| *b == b'\n') {
        Some(nl) => offset - nl,
        None => offset + 1,
    };
    (line, column)
}

/// Drop the ` at line L column C` (or ` at position N`) tail some parsers
/// append; `ParseError` carries the position itself.
pub(crate) fn strip_location(message: &str) -> &str {
    let Some((head, tail)) = message.rsplit_once(" at ") else {
        return message;
    };
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let words: Vec<&str> = tail.split(' ').collect();
    let is_location = match words.as_slice() {
        ["line", l, "column", c] => numeric(l) && numeric(c),
        ["position", p] => numeric(p),
        _ => false,
    };
    if is_location { head } else { message }
}

fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| candidates.iter().any(|c| ext.eq_ignore_ascii_case(c)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_by_extension() {
        assert_eq!(DocumentFormat::detect(Path::new("a.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::detect(Path::new("a.YAML")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::detect(Path::new("a.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::detect(Path::new("a.toml")), DocumentFormat::Toml);
        assert_eq!(DocumentFormat::detect(Path::new("agent")), DocumentFormat::Json);
        assert!(is_supported(Path::new("x.yml")));
        assert!(!is_supported(Path::new("notes.md")));
    }

    #[test]
    fn same_document_in_every_format_yields_same_tree() {
        let json = extract("a.json", br#"{"name": "a", "tools": [{"tool_spec": {"type": "generic", "name": "t"}}]}"#)
            .expect("json");
        let yaml = extract(
            "a.yaml",
            b"name: a\ntools:\n  - tool_spec:\n      type: generic\n      name: t\n",
        )
        .expect("yaml");
        let toml = extract(
            "a.toml",
            b"name = \"a\"\n[[tools]]\n[tools.tool_spec]\ntype = \"generic\"\nname = \"t\"\n",
        )
        .expect("toml");
        assert_eq!(json, yaml);
        assert_eq!(json, toml);
    }

    #[test]
    fn invalid_utf8_reports_position() {
        let err = extract("bad.json", b"{\n  \"name\": \"\xff\"\n}").err().expect("must fail");
        assert_eq!(err.line, Some(2));
        assert_eq!(err.column, Some(12));
        assert!(err.message.contains("UTF-8"));
        assert!(err.to_string().starts_with("bad.json:2:12: invalid JSON"));
    }

    #[test]
    fn location_tail_is_stripped_once() {
        assert_eq!(strip_location("expected `,` at line 3 column 1"), "expected `,`");
        assert_eq!(strip_location("did not find expected key at position 12"), "did not find expected key");
        assert_eq!(strip_location("look at this"), "look at this");
        assert_eq!(strip_location("no position"), "no position");
    }

    #[test]
    fn line_col_counts_from_one() {
        assert_eq!(line_col(b"abc", 0), (1, 1));
        assert_eq!(line_col(b"ab\ncd", 4), (2, 2));
    }
}
