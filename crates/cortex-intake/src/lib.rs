//! Validation and assembly of Cortex agent definitions.
//!
//! Agent documents (JSON, YAML or TOML) are checked against an embedded
//! declarative schema, decoded into typed requests, joined with their tool
//! resources and handed to an `AgentSink` that renders the create request.

pub mod batch;
pub mod config;
pub mod decode;
pub mod extract;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod schema;
pub mod sink;
pub mod unify;

pub use model::{CortexAgent, CreateMode};
pub use pipeline::{Overrides, Pipeline, PipelineError, PipelineOptions};
pub use schema::SchemaStore;
