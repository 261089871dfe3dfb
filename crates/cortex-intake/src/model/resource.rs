//! Resolved, tool-type-specific resource descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::tool::ToolType;

/// Resource backing one declared tool. Serializes as the bare payload, the
/// shape the agent service expects under `tool_resources.<tool name>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResource {
    Analyst(AnalystResource),
    Search(SearchResource),
    Generic(GenericResource),
}

impl ToolResource {
    pub fn tool_type(&self) -> ToolType {
        match self {
            ToolResource::Analyst(_) => ToolType::CortexAnalystTextToSql,
            ToolResource::Search(_) => ToolType::CortexSearch,
            ToolResource::Generic(_) => ToolType::Generic,
        }
    }
}

/// Resource for `cortex_analyst_text_to_sql`: exactly one semantic source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalystResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_view: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_model_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_environment: Option<ExecutionEnvironment>,
}

/// Resource for `cortex_search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchResource {
    pub search_service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_column: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl SearchResource {
    pub fn new(search_service: impl Into<String>) -> Self {
        Self {
            search_service: search_service.into(),
            max_results: None,
            filter: None,
            id_column: None,
            title_column: None,
            columns: Vec::new(),
        }
    }
}

/// Resource for `generic` tools backed by a function or stored procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericResource {
    #[serde(rename = "type")]
    pub kind: GenericResourceKind,
    pub identifier: String,
    pub execution_environment: ExecutionEnvironment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericResourceKind {
    Function,
    Procedure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionEnvironment {
    #[serde(rename = "type")]
    pub kind: ExecutionEnvironmentKind,
    pub warehouse: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEnvironmentKind {
    Warehouse,
}

impl ExecutionEnvironment {
    pub fn warehouse(name: impl Into<String>) -> Self {
        Self {
            kind: ExecutionEnvironmentKind::Warehouse,
            warehouse: name.into(),
            query_timeout: None,
        }
    }
}
