//! Declarative schema for agent documents: compilation and path lookup.
//!
//! The schema source is a JSON Schema document restricted to the keywords
//! listed in `compile`. It is embedded at build time, compiled once, and
//! shared read-only by every pipeline run.

pub mod compile;
pub mod store;
pub mod types;

pub use store::*;
pub use types::*;

use thiserror::Error;

/// Schema text compiled into the binary.
pub const EMBEDDED_SCHEMA: &str = include_str!("../../schema/cortex_agent.schema.json");

/// Path of the top-level agent document definition.
pub const AGENT_DEF_PATH: &str = "#/$defs/CortexAgent";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema source is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("invalid schema at {location}: {reason}")]
    Compile { location: String, reason: String },
    #[error("schema path not found: {0}")]
    PathNotFound(String),
}
