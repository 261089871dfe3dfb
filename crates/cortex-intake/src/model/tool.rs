//! Tool declarations and raw (unresolved) tool resource entries.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Tool types understood by the agent service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    CortexAnalystTextToSql,
    CortexSearch,
    Generic,
    DataToChart,
}

/// Whether a tool type is backed by a tool resource entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRequirement {
    Required,
    NotAccepted,
}

impl ToolType {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolType::CortexAnalystTextToSql => "cortex_analyst_text_to_sql",
            ToolType::CortexSearch => "cortex_search",
            ToolType::Generic => "generic",
            ToolType::DataToChart => "data_to_chart",
        }
    }

    pub fn resource_requirement(self) -> ResourceRequirement {
        match self {
            ToolType::CortexAnalystTextToSql | ToolType::CortexSearch | ToolType::Generic => {
                ResourceRequirement::Required
            }
            ToolType::DataToChart => ResourceRequirement::NotAccepted,
        }
    }

    /// Schema path of the resource payload definition for this tool type.
    pub fn resource_schema_path(self) -> Option<&'static str> {
        match self {
            ToolType::CortexAnalystTextToSql => Some("#/$defs/AnalystToolResource"),
            ToolType::CortexSearch => Some("#/$defs/SearchToolResource"),
            ToolType::Generic => Some("#/$defs/GenericToolResource"),
            ToolType::DataToChart => None,
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tool {
    pub tool_spec: ToolSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonValue>,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.tool_spec.name
    }

    pub fn tool_type(&self) -> ToolType {
        self.tool_spec.tool_type
    }
}

/// Tool resource entry as written in the document: a name plus fields whose
/// meaning depends on the matching tool's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolResource {
    pub name: String,
    #[serde(flatten)]
    pub payload: JsonMap<String, JsonValue>,
}
