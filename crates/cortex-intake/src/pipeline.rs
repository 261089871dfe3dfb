//! End-to-end processing of one agent document.
//!
//! extract -> apply overrides -> unify -> decode -> resolve -> assemble.
//! Every stage is synchronous and the pipeline holds only read-only state,
//! so one `Pipeline` can be shared across tasks.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::decode::{DecodeError, decode};
use crate::extract::{ParseError, extract};
use crate::model::CortexAgent;
use crate::resolve::{MissingResourcePolicy, ResolveError, ResourceSchemas, resolve};
use crate::schema::{AGENT_DEF_PATH, SchemaError, SchemaStore, SubSchema};
use crate::unify::{ValidationError, unify};

/// Values that replace the document's own location and name before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub name: Option<String>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.database_name.is_none() && self.schema_name.is_none() && self.name.is_none()
    }

    /// Non-object documents are left alone; validation reports them.
    pub fn apply(&self, value: &mut JsonValue) {
        let JsonValue::Object(map) = value else {
            return;
        };
        for (key, replacement) in [
            ("database_name", &self.database_name),
            ("schema_name", &self.schema_name),
            ("name", &self.name),
        ] {
            if let Some(v) = replacement {
                map.insert(key.to_string(), JsonValue::String(v.clone()));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub missing_resources: MissingResourcePolicy,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Resolution(#[from] ResolveError),
}

impl PipelineError {
    /// One line naming the failed stage.
    pub fn summary(&self) -> String {
        match self {
            PipelineError::Parse(e) => format!("could not parse {} document", e.format),
            PipelineError::Validation(e) => {
                format!("document does not match {}", e.schema)
            }
            PipelineError::Decode(_) => "validated document could not be decoded".to_string(),
            PipelineError::Resolution(_) => "tool resources could not be resolved".to_string(),
        }
    }

    /// One line per violation or issue.
    pub fn details(&self) -> Vec<String> {
        match self {
            PipelineError::Parse(e) => vec![e.to_string()],
            PipelineError::Validation(e) => e.violations.iter().map(ToString::to_string).collect(),
            PipelineError::Decode(e) => vec![e.to_string()],
            PipelineError::Resolution(e) => e.details(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            PipelineError::Validation(e) => e.violations.len(),
            PipelineError::Resolution(e) => e.count(),
            PipelineError::Parse(_) | PipelineError::Decode(_) => 1,
        }
    }
}

/// Shared, read-only processing state built once from the schema store.
#[derive(Debug, Clone)]
pub struct Pipeline {
    agent: SubSchema,
    resources: ResourceSchemas,
    options: PipelineOptions,
}

impl Pipeline {
    /// Looks up every sub-schema the stages need. A lookup failure here means
    /// the embedded schema and the code disagree.
    pub fn new(store: Arc<SchemaStore>, options: PipelineOptions) -> Result<Self, SchemaError> {
        let agent = store.lookup(AGENT_DEF_PATH)?;
        let resources = ResourceSchemas::load(&store)?;
        Ok(Self {
            agent,
            resources,
            options,
        })
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn build_agent(
        &self,
        filename: &str,
        bytes: &[u8],
        overrides: &Overrides,
    ) -> Result<CortexAgent, PipelineError> {
        let mut raw = extract(filename, bytes)?;
        if !overrides.is_empty() {
            tracing::debug!("{}: applying overrides {:?}", filename, overrides);
            overrides.apply(&mut raw);
        }

        let validated = unify(&self.agent, raw)?;
        tracing::debug!("{}: document validated", filename);

        let mut request = decode(validated)?;
        let tool_resources = std::mem::take(&mut request.tool_resources);
        let resolved = resolve(
            &tool_resources,
            &request.tools,
            &self.resources,
            self.options.missing_resources,
        )?;
        tracing::debug!("{}: resolved {} tool resource(s)", filename, resolved.len());

        let agent = CortexAgent::assemble(request, resolved);
        tracing::info!(
            "{}: built agent {} with {} tool(s)",
            filename,
            agent.qualified_name(),
            agent.tools.len()
        );
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use jsonschema::Draft;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::model::{AnalystResource, ExecutionEnvironment, SearchResource, ToolResource};
    use crate::schema::EMBEDDED_SCHEMA;
    use crate::unify::check;

    const SALES_JSON: &[u8] = include_bytes!("../fixtures/sales_helper.json");
    const SALES_YAML: &[u8] = include_bytes!("../fixtures/sales_helper.yaml");
    const OPS_TOML: &[u8] = include_bytes!("../fixtures/ops_runner.toml");
    const BROKEN_JSON: &[u8] = include_bytes!("../fixtures/broken_agent.json");
    const MISMATCHED_YAML: &[u8] = include_bytes!("../fixtures/mismatched_resources.yaml");

    fn store() -> Arc<SchemaStore> {
        Arc::new(SchemaStore::embedded().expect("schema"))
    }

    fn pipeline(policy: MissingResourcePolicy) -> Pipeline {
        Pipeline::new(
            store(),
            PipelineOptions {
                missing_resources: policy,
            },
        )
        .expect("pipeline")
    }

    #[test]
    fn builds_agent_from_json_fixture() {
        let agent = pipeline(MissingResourcePolicy::Strict)
            .build_agent("sales_helper.json", SALES_JSON, &Overrides::default())
            .expect("agent");
        assert_eq!(agent.qualified_name(), "SALES.AGENTS.sales_helper");
        assert_eq!(agent.tools.len(), 3);
        assert_eq!(agent.tool_resources.len(), 2);
        assert_eq!(
            agent.tool_resources.get("revenue"),
            Some(&ToolResource::Analyst(AnalystResource {
                semantic_view: Some("SALES.MODELS.REVENUE".into()),
                semantic_model_file: None,
                execution_environment: Some(ExecutionEnvironment {
                    query_timeout: Some(120),
                    ..ExecutionEnvironment::warehouse("ANALYST_WH")
                }),
            }))
        );
        let Some(ToolResource::Search(search)) = agent.tool_resources.get("policies") else {
            panic!("policies should resolve to a search resource");
        };
        assert_eq!(search.max_results, Some(5));
        assert_eq!(search.columns, vec!["BODY".to_string(), "UPDATED_AT".to_string()]);
        assert!(!agent.tool_resources.contains_key("chart"));
    }

    #[test]
    fn yaml_and_json_fixtures_build_the_same_agent() {
        let p = pipeline(MissingResourcePolicy::Strict);
        let from_json = p
            .build_agent("a.json", SALES_JSON, &Overrides::default())
            .expect("json");
        let from_yaml = p
            .build_agent("a.yaml", SALES_YAML, &Overrides::default())
            .expect("yaml");
        assert_eq!(from_json, from_yaml);
    }

    #[test]
    fn builds_generic_tool_agent_from_toml() {
        let agent = pipeline(MissingResourcePolicy::Strict)
            .build_agent("ops_runner.toml", OPS_TOML, &Overrides::default())
            .expect("agent");
        assert!(matches!(
            agent.tool_resources.get("refresh_dashboards"),
            Some(ToolResource::Generic(_))
        ));
        assert_eq!(agent.tools[0].tool_spec.input_schema, Some(json!({"type": "object"})));
    }

    #[test]
    fn overrides_replace_location_before_validation() {
        let overrides = Overrides {
            database_name: Some("DEV".into()),
            schema_name: Some("SANDBOX".into()),
            name: None,
        };
        let agent = pipeline(MissingResourcePolicy::Strict)
            .build_agent("sales_helper.json", SALES_JSON, &overrides)
            .expect("agent");
        assert_eq!(agent.qualified_name(), "DEV.SANDBOX.sales_helper");

        let empty_name = Overrides {
            name: Some(String::new()),
            ..Overrides::default()
        };
        let err = pipeline(MissingResourcePolicy::Strict)
            .build_agent("sales_helper.json", SALES_JSON, &empty_name)
            .err()
            .expect("empty name is invalid");
        assert_eq!(err.details(), vec!["name: must not be empty".to_string()]);
    }

    #[test]
    fn validation_failure_lists_every_violation() {
        let err = pipeline(MissingResourcePolicy::Strict)
            .build_agent("broken_agent.json", BROKEN_JSON, &Overrides::default())
            .err()
            .expect("broken");
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(err.summary(), "document does not match #/$defs/CortexAgent");
        assert_eq!(err.count(), 5);
        let details = err.details();
        let paths: Vec<&str> = details
            .iter()
            .filter_map(|d| d.split(": ").next())
            .collect();
        assert_eq!(
            paths,
            vec![
                "orchestration.budget.seconds",
                "owner",
                "schema_name",
                "tools[0].tool_spec.type",
                "tools[1].tool_spec.type",
            ]
        );
    }

    #[test]
    fn resolution_failure_reports_unmatched_and_missing() {
        let err = pipeline(MissingResourcePolicy::Strict)
            .build_agent("mismatched.yaml", MISMATCHED_YAML, &Overrides::default())
            .err()
            .expect("mismatched");
        assert_eq!(err.summary(), "tool resources could not be resolved");
        assert_eq!(err.count(), 2);

        let lenient = pipeline(MissingResourcePolicy::Lenient)
            .build_agent("mismatched.yaml", MISMATCHED_YAML, &Overrides::default())
            .err()
            .expect("unmatched entry still fails");
        assert_eq!(lenient.count(), 1);
    }

    #[test]
    fn payload_violations_each_get_a_detail_line() {
        let doc = json!({
            "database_name": "DB",
            "schema_name": "S",
            "name": "n",
            "tools": [
                {"tool_spec": {"type": "cortex_search", "name": "a"}},
                {"tool_spec": {"type": "cortex_search", "name": "b"}}
            ],
            "tool_resources": [
                {"name": "a", "search_service": "docs"},
                {"name": "b", "max_results": 500, "bogus": 1}
            ]
        });
        let bytes = serde_json::to_vec(&doc).expect("bytes");
        let err = pipeline(MissingResourcePolicy::Strict)
            .build_agent("doc.json", &bytes, &Overrides::default())
            .err()
            .expect("invalid payload");
        assert!(matches!(err, PipelineError::Resolution(_)));
        assert_eq!(err.count(), 3);
        assert_eq!(
            err.details(),
            vec![
                "tool_resources[1].search_service: field is required (tool resource 'b')".to_string(),
                "tool_resources[1].bogus: field is not allowed (tool resource 'b')".to_string(),
                "tool_resources[1].max_results: must be <= 100, found 500 (tool resource 'b')".to_string(),
            ]
        );
    }

    #[test]
    fn parse_failure_counts_once() {
        let err = pipeline(MissingResourcePolicy::Strict)
            .build_agent("bad.json", b"{\"name\": ", &Overrides::default())
            .err()
            .expect("parse error");
        assert!(matches!(err, PipelineError::Parse(_)));
        assert_eq!(err.count(), 1);
        assert_eq!(err.summary(), "could not parse JSON document");
        assert!(err.details()[0].starts_with("bad.json:1:"));
    }

    #[test]
    fn embedded_schema_is_valid_draft_2020_12_and_agrees_with_unifier() {
        let schema: JsonValue = serde_json::from_str(EMBEDDED_SCHEMA).expect("schema json");
        let reference = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .expect("embedded schema builds under jsonschema");
        let agent = store().lookup(AGENT_DEF_PATH).expect("agent def");

        for (name, bytes) in [
            ("sales_helper.json", SALES_JSON),
            ("sales_helper.yaml", SALES_YAML),
            ("ops_runner.toml", OPS_TOML),
            ("broken_agent.json", BROKEN_JSON),
            ("mismatched_resources.yaml", MISMATCHED_YAML),
        ] {
            let doc = extract(name, bytes).expect("fixture parses");
            assert_eq!(
                reference.is_valid(&doc),
                check(&agent, &doc).is_empty(),
                "validators disagree on {name}"
            );
        }
        for doc in [
            json!({}),
            json!([]),
            json!({"database_name": "D", "schema_name": "S", "name": "n", "tools": [{}]}),
            json!({"database_name": "D", "schema_name": "S", "name": "n", "profile": {"display_name": ""}}),
            json!({"database_name": "D", "schema_name": "S", "name": "n", "orchestration": {"budget": {"seconds": 3601}}}),
            json!({"database_name": "D", "schema_name": "S", "name": "n", "tool_resources": [{"name": "x", "anything": 1}]}),
        ] {
            assert_eq!(
                reference.is_valid(&doc),
                check(&agent, &doc).is_empty(),
                "validators disagree on {doc}"
            );
        }
    }

    #[test]
    fn resource_schemas_agree_with_reference_validator() {
        let schema: JsonValue = serde_json::from_str(EMBEDDED_SCHEMA).expect("schema json");
        let s = store();
        for (def, payload) in [
            ("SearchToolResource", json!({"search_service": "docs"})),
            ("SearchToolResource", json!({"search_service": "docs", "columns": []})),
            ("AnalystToolResource", json!({"semantic_model_file": "@stage/model.yaml"})),
            ("GenericToolResource", json!({"type": "function", "identifier": "f"})),
        ] {
            let mut wrapped = schema.clone();
            wrapped["$ref"] = json!(format!("#/$defs/{def}"));
            let reference = jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&wrapped)
                .expect("builds");
            let ours = s.lookup(&format!("#/$defs/{def}")).expect("def");
            assert_eq!(
                reference.is_valid(&payload),
                check(&ours, &payload).is_empty(),
                "validators disagree on {def} {payload}"
            );
        }
    }

    proptest! {
        #[test]
        fn rebuilding_identical_bytes_yields_equal_agents(
            name in "[a-z][a-z0-9_]{0,20}",
            service in "[A-Z]{1,10}",
            max_results in 1u32..=100,
        ) {
            let doc = json!({
                "database_name": "DB",
                "schema_name": "S",
                "name": name,
                "tools": [{"tool_spec": {"type": "cortex_search", "name": "search"}}],
                "tool_resources": [{"name": "search", "search_service": service.clone(), "max_results": max_results}]
            });
            let bytes = serde_json::to_vec(&doc).expect("bytes");
            let p = pipeline(MissingResourcePolicy::Strict);
            let first = p.build_agent("doc.json", &bytes, &Overrides::default()).expect("first");
            let second = p.build_agent("doc.json", &bytes, &Overrides::default()).expect("second");
            prop_assert_eq!(&first, &second);
            let expected = ToolResource::Search(SearchResource {
                max_results: Some(max_results),
                ..SearchResource::new(service)
            });
            prop_assert_eq!(first.tool_resources.get("search"), Some(&expected));
        }
    }
}
