//! The assembled agent and how it is presented to the agent service.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::naming::qualified_name;
use super::request::{AgentInstructions, AgentProfile, CreateRequest, ModelConfig, OrchestrationConfig};
use super::resource::ToolResource;
use super::tool::Tool;

/// A fully validated agent with every tool resource resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CortexAgent {
    pub database_name: String,
    pub schema_name: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<AgentProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<AgentInstructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<OrchestrationConfig>,
    pub tools: Vec<Tool>,
    pub tool_resources: BTreeMap<String, ToolResource>,
}

impl CortexAgent {
    pub fn assemble(request: CreateRequest, tool_resources: BTreeMap<String, ToolResource>) -> Self {
        let CreateRequest {
            database_name,
            schema_name,
            name,
            comment,
            profile,
            models,
            instructions,
            orchestration,
            tools,
            tool_resources: _,
        } = request;
        Self {
            database_name,
            schema_name,
            name,
            comment,
            profile,
            models,
            instructions,
            orchestration,
            tools,
            tool_resources,
        }
    }

    /// `database.schema.name`
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.database_name, &self.schema_name, &self.name)
    }

    /// Body of the REST create call. Database and schema travel in the URL.
    pub fn request_body(&self) -> Result<JsonValue, serde_json::Error> {
        let mut body = Map::new();
        body.insert("name".into(), JsonValue::String(self.name.clone()));
        if let Some(comment) = &self.comment {
            body.insert("comment".into(), JsonValue::String(comment.clone()));
        }
        if let Some(profile) = &self.profile {
            body.insert("profile".into(), serde_json::to_value(profile)?);
        }
        if let JsonValue::Object(spec) = self.specification()? {
            body.extend(spec);
        }
        Ok(JsonValue::Object(body))
    }

    /// The behavioural part of the agent: models, instructions, orchestration,
    /// tools and their resources. Empty sections are left out.
    pub fn specification(&self) -> Result<JsonValue, serde_json::Error> {
        let mut spec = Map::new();
        if let Some(models) = &self.models {
            spec.insert("models".into(), serde_json::to_value(models)?);
        }
        if let Some(instructions) = &self.instructions {
            spec.insert("instructions".into(), serde_json::to_value(instructions)?);
        }
        if let Some(orchestration) = &self.orchestration {
            spec.insert("orchestration".into(), serde_json::to_value(orchestration)?);
        }
        if !self.tools.is_empty() {
            spec.insert("tools".into(), serde_json::to_value(&self.tools)?);
        }
        if !self.tool_resources.is_empty() {
            spec.insert("tool_resources".into(), serde_json::to_value(&self.tool_resources)?);
        }
        Ok(JsonValue::Object(spec))
    }
}

/// How the service treats an agent that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CreateMode {
    #[default]
    ErrorIfExists,
    OrReplace,
    IfNotExists,
}

impl CreateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CreateMode::ErrorIfExists => "errorIfExists",
            CreateMode::OrReplace => "orReplace",
            CreateMode::IfNotExists => "ifNotExists",
        }
    }
}

impl fmt::Display for CreateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreateMode {
    type Err = String;

    /// Accepts the wire spelling as well as kebab/snake case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "errorifexists" => Ok(CreateMode::ErrorIfExists),
            "orreplace" => Ok(CreateMode::OrReplace),
            "ifnotexists" => Ok(CreateMode::IfNotExists),
            _ => Err(format!(
                "unknown create mode '{s}' (expected errorIfExists, orReplace or ifNotExists)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SearchResource, ToolSpec, ToolType};
    use serde_json::json;

    fn agent() -> CortexAgent {
        let mut resources = BTreeMap::new();
        resources.insert("search".to_string(), ToolResource::Search(SearchResource::new("docs")));
        CortexAgent {
            database_name: "DB".into(),
            schema_name: "PUBLIC".into(),
            name: "helper".into(),
            comment: Some("it's useful".into()),
            profile: Some(AgentProfile {
                display_name: Some("Helper".into()),
                ..Default::default()
            }),
            models: Some(ModelConfig {
                orchestration: "auto".into(),
            }),
            instructions: None,
            orchestration: None,
            tools: vec![Tool {
                tool_spec: ToolSpec {
                    tool_type: ToolType::CortexSearch,
                    name: "search".into(),
                    description: None,
                    input_schema: None,
                },
            }],
            tool_resources: resources,
        }
    }

    #[test]
    fn request_body_omits_location_and_keys_resources_by_tool() {
        let body = agent().request_body().expect("body");
        assert_eq!(
            body,
            json!({
                "name": "helper",
                "comment": "it's useful",
                "profile": {"display_name": "Helper"},
                "models": {"orchestration": "auto"},
                "tools": [{"tool_spec": {"type": "cortex_search", "name": "search"}}],
                "tool_resources": {"search": {"search_service": "docs"}}
            })
        );
    }

    #[test]
    fn specification_leaves_out_identity() {
        let spec = agent().specification().expect("spec");
        assert!(spec.get("name").is_none());
        assert!(spec.get("comment").is_none());
        assert!(spec.get("tools").is_some());
        assert_eq!(agent().qualified_name(), "DB.PUBLIC.helper");
    }

    #[test]
    fn create_mode_parses_loosely_and_prints_wire_form() {
        assert_eq!("orReplace".parse::<CreateMode>(), Ok(CreateMode::OrReplace));
        assert_eq!("if-not-exists".parse::<CreateMode>(), Ok(CreateMode::IfNotExists));
        assert_eq!("ERROR_IF_EXISTS".parse::<CreateMode>(), Ok(CreateMode::ErrorIfExists));
        assert!("replace".parse::<CreateMode>().is_err());
        assert_eq!(CreateMode::default().to_string(), "errorIfExists");
    }
}
