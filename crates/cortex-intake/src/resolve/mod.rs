//! Name-keyed join of declared tools with their tool resource entries.
//!
//! Each entry's payload is validated against the resource definition selected
//! by the matching tool's type, then decoded into a `ToolResource`. All
//! problems are collected before returning.

mod issue;

pub use issue::{MissingResourcePolicy, ResolveError, ResourceIssue};

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::model::{
    AnalystResource, GenericResource, RawToolResource, ResourceRequirement, SearchResource, Tool,
    ToolResource, ToolType,
};
use crate::schema::{SchemaError, SchemaStore, SubSchema};
use crate::unify::{FieldPath, Validated, Violation, ViolationKind, unify};

/// Resource payload sub-schemas, looked up once per pipeline.
#[derive(Debug, Clone)]
pub struct ResourceSchemas {
    analyst: SubSchema,
    search: SubSchema,
    generic: SubSchema,
}

impl ResourceSchemas {
    pub fn load(store: &Arc<SchemaStore>) -> Result<Self, SchemaError> {
        let at = |tool_type: ToolType| {
            let path = tool_type
                .resource_schema_path()
                .ok_or_else(|| SchemaError::PathNotFound(format!("resource schema for {tool_type}")))?;
            store.lookup(path)
        };
        Ok(Self {
            analyst: at(ToolType::CortexAnalystTextToSql)?,
            search: at(ToolType::CortexSearch)?,
            generic: at(ToolType::Generic)?,
        })
    }

    pub fn for_type(&self, tool_type: ToolType) -> Option<&SubSchema> {
        match tool_type {
            ToolType::CortexAnalystTextToSql => Some(&self.analyst),
            ToolType::CortexSearch => Some(&self.search),
            ToolType::Generic => Some(&self.generic),
            ToolType::DataToChart => None,
        }
    }
}

/// Match every tool resource entry to the tool of the same name.
///
/// Issues come out in discovery order: duplicate tools, then entries in
/// document order, then tools left without a resource in tool order.
pub fn resolve(
    tool_resources: &[RawToolResource],
    tools: &[Tool],
    schemas: &ResourceSchemas,
    policy: MissingResourcePolicy,
) -> Result<BTreeMap<String, ToolResource>, ResolveError> {
    let mut issues = Vec::new();

    let mut by_name: HashMap<&str, ToolType> = HashMap::with_capacity(tools.len());
    for tool in tools {
        match by_name.entry(tool.name()) {
            Entry::Occupied(_) => issues.push(ResourceIssue::DuplicateTool {
                name: tool.name().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(tool.tool_type());
            }
        }
    }

    let mut resolved = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::with_capacity(tool_resources.len());
    for (idx, entry) in tool_resources.iter().enumerate() {
        let name = entry.name.as_str();
        if !seen.insert(name) {
            issues.push(ResourceIssue::DuplicateResource {
                name: name.to_string(),
            });
            continue;
        }
        let Some(&tool_type) = by_name.get(name) else {
            issues.push(ResourceIssue::Unmatched {
                name: name.to_string(),
            });
            continue;
        };
        let at = FieldPath::root().field("tool_resources").index(idx);
        match resolve_entry(entry, tool_type, schemas, &at) {
            Ok(resource) => {
                tracing::debug!("resolved {} resource for tool '{}'", tool_type, name);
                resolved.insert(name.to_string(), resource);
            }
            Err(violations) => issues.push(ResourceIssue::InvalidPayload {
                name: name.to_string(),
                tool_type,
                violations,
            }),
        }
    }

    let mut checked: HashSet<&str> = HashSet::with_capacity(tools.len());
    for tool in tools {
        if !checked.insert(tool.name())
            || tool.tool_type().resource_requirement() != ResourceRequirement::Required
            || seen.contains(tool.name())
        {
            continue;
        }
        match policy {
            MissingResourcePolicy::Strict => issues.push(ResourceIssue::Missing {
                name: tool.name().to_string(),
                tool_type: tool.tool_type(),
            }),
            MissingResourcePolicy::Lenient => tracing::warn!(
                "tool '{}' ({}) has no tool resource; continuing without one",
                tool.name(),
                tool.tool_type()
            ),
        }
    }

    if issues.is_empty() {
        Ok(resolved)
    } else {
        Err(ResolveError { issues })
    }
}

/// Violations come back rooted at `at`, the entry's place in the document.
fn resolve_entry(
    entry: &RawToolResource,
    tool_type: ToolType,
    schemas: &ResourceSchemas,
    at: &FieldPath,
) -> Result<ToolResource, Vec<Violation>> {
    let violation = |path: FieldPath, kind, message: String| vec![Violation { path, kind, message }];
    let Some(schema) = schemas.for_type(tool_type) else {
        return Err(violation(
            at.clone(),
            ViolationKind::NotAllowed,
            format!("{tool_type} tools do not take a tool resource"),
        ));
    };
    let validated = unify(schema, JsonValue::Object(entry.payload.clone())).map_err(|e| {
        e.violations
            .into_iter()
            .map(|v| Violation {
                path: v.path.under(at),
                ..v
            })
            .collect::<Vec<_>>()
    })?;
    match tool_type {
        ToolType::CortexAnalystTextToSql => {
            let analyst: AnalystResource = decode_payload(validated, at)?;
            match (&analyst.semantic_view, &analyst.semantic_model_file) {
                (Some(_), None) | (None, Some(_)) => Ok(ToolResource::Analyst(analyst)),
                (Some(_), Some(_)) => Err(violation(
                    at.clone().field("semantic_model_file"),
                    ViolationKind::NotAllowed,
                    "semantic_view and semantic_model_file are mutually exclusive".to_string(),
                )),
                (None, None) => Err(violation(
                    at.clone().field("semantic_view"),
                    ViolationKind::MissingField,
                    "one of semantic_view or semantic_model_file is required".to_string(),
                )),
            }
        }
        ToolType::CortexSearch => decode_payload::<SearchResource>(validated, at).map(ToolResource::Search),
        ToolType::Generic => decode_payload::<GenericResource>(validated, at).map(ToolResource::Generic),
        ToolType::DataToChart => Err(violation(
            at.clone(),
            ViolationKind::NotAllowed,
            format!("{tool_type} tools do not take a tool resource"),
        )),
    }
}

fn decode_payload<T: DeserializeOwned>(value: Validated, at: &FieldPath) -> Result<T, Vec<Violation>> {
    serde_json::from_value(value.into_inner()).map_err(|e| {
        tracing::error!("validated tool resource does not decode: {}", e);
        vec![Violation {
            path: at.clone(),
            kind: ViolationKind::TypeMismatch,
            message: e.to_string(),
        }]
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Map, json};

    use super::*;
    use crate::model::{ExecutionEnvironment, GenericResourceKind, ToolSpec};

    fn schemas() -> ResourceSchemas {
        let store = Arc::new(SchemaStore::embedded().expect("schema"));
        ResourceSchemas::load(&store).expect("resource schemas")
    }

    fn tool(name: &str, tool_type: ToolType) -> Tool {
        Tool {
            tool_spec: ToolSpec {
                tool_type,
                name: name.to_string(),
                description: None,
                input_schema: None,
            },
        }
    }

    fn entry(value: JsonValue) -> RawToolResource {
        serde_json::from_value(value).expect("raw entry")
    }

    #[test]
    fn search_tool_resolves_to_search_resource() {
        let resolved = resolve(
            &[entry(json!({"name": "search", "search_service": "docs"}))],
            &[tool("search", ToolType::CortexSearch)],
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .expect("resolved");
        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved.get("search"),
            Some(&ToolResource::Search(SearchResource::new("docs")))
        );
    }

    #[test]
    fn unmatched_entry_and_missing_resource_are_both_reported() {
        let err = resolve(
            &[entry(json!({"name": "other", "search_service": "docs"}))],
            &[tool("search", ToolType::CortexSearch)],
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .err()
        .expect("must fail");
        assert_eq!(
            err.issues,
            vec![
                ResourceIssue::Unmatched {
                    name: "other".into()
                },
                ResourceIssue::Missing {
                    name: "search".into(),
                    tool_type: ToolType::CortexSearch
                },
            ]
        );
        assert!(err.to_string().starts_with("2 tool resource issue(s)"));
    }

    #[test]
    fn lenient_policy_omits_tools_without_resources() {
        let resolved = resolve(
            &[],
            &[tool("search", ToolType::CortexSearch)],
            &schemas(),
            MissingResourcePolicy::Lenient,
        )
        .expect("lenient");
        assert!(resolved.is_empty());
    }

    #[test]
    fn chart_tools_need_no_resource_and_reject_one() {
        let tools = [tool("chart", ToolType::DataToChart)];
        assert!(resolve(&[], &tools, &schemas(), MissingResourcePolicy::Strict)
            .expect("no resource needed")
            .is_empty());

        let err = resolve(
            &[entry(json!({"name": "chart", "x": 1}))],
            &tools,
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .err()
        .expect("must fail");
        assert!(matches!(
            &err.issues[..],
            [ResourceIssue::InvalidPayload { name, tool_type: ToolType::DataToChart, .. }] if name == "chart"
        ));
    }

    #[test]
    fn payload_is_checked_against_the_tool_type_schema() {
        let err = resolve(
            &[entry(json!({"name": "search", "search_service": "docs", "max_results": 500, "warehouse": "WH"}))],
            &[tool("search", ToolType::CortexSearch)],
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .err()
        .expect("must fail");
        match &err.issues[..] {
            [ResourceIssue::InvalidPayload { violations, .. }] => {
                let found: Vec<(String, ViolationKind)> = violations
                    .iter()
                    .map(|v| (v.path.to_string(), v.kind))
                    .collect();
                assert_eq!(
                    found,
                    vec![
                        ("tool_resources[0].max_results".to_string(), ViolationKind::OutOfRange),
                        ("tool_resources[0].warehouse".to_string(), ViolationKind::UnknownField),
                    ]
                );
            }
            other => panic!("unexpected issues {other:?}"),
        }
    }

    #[test]
    fn analyst_needs_exactly_one_semantic_source() {
        let tools = [tool("analyst", ToolType::CortexAnalystTextToSql)];
        let ok = resolve(
            &[entry(json!({"name": "analyst", "semantic_view": "DB.S.SALES"}))],
            &tools,
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .expect("one source");
        assert!(matches!(ok.get("analyst"), Some(ToolResource::Analyst(_))));

        for payload in [
            json!({"name": "analyst"}),
            json!({"name": "analyst", "semantic_view": "V", "semantic_model_file": "@s/m.yaml"}),
        ] {
            let err = resolve(&[entry(payload)], &tools, &schemas(), MissingResourcePolicy::Strict)
                .err()
                .expect("must fail");
            assert!(matches!(err.issues[0], ResourceIssue::InvalidPayload { .. }));
        }

        let err = resolve(
            &[
                entry(json!({"name": "other", "search_service": "s"})),
                entry(json!({"name": "analyst"})),
            ],
            &tools,
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .err()
        .expect("must fail");
        match &err.issues[..] {
            [ResourceIssue::Unmatched { .. }, ResourceIssue::InvalidPayload { violations, .. }] => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].path.to_string(), "tool_resources[1].semantic_view");
                assert_eq!(violations[0].kind, ViolationKind::MissingField);
            }
            other => panic!("unexpected issues {other:?}"),
        }
    }

    #[test]
    fn generic_resource_decodes_with_execution_environment() {
        let resolved = resolve(
            &[entry(json!({
                "name": "refresh",
                "type": "procedure",
                "identifier": "DB.S.REFRESH",
                "execution_environment": {"type": "warehouse", "warehouse": "WH"}
            }))],
            &[tool("refresh", ToolType::Generic)],
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .expect("resolved");
        assert_eq!(
            resolved.get("refresh"),
            Some(&ToolResource::Generic(GenericResource {
                kind: GenericResourceKind::Procedure,
                identifier: "DB.S.REFRESH".into(),
                execution_environment: ExecutionEnvironment::warehouse("WH"),
            }))
        );
    }

    #[test]
    fn duplicates_are_reported_first_then_in_document_order() {
        let err = resolve(
            &[
                entry(json!({"name": "a", "search_service": "s"})),
                entry(json!({"name": "a", "search_service": "s"})),
                entry(json!({"name": "zzz", "search_service": "s"})),
            ],
            &[
                tool("a", ToolType::CortexSearch),
                tool("b", ToolType::CortexSearch),
                tool("a", ToolType::CortexSearch),
            ],
            &schemas(),
            MissingResourcePolicy::Strict,
        )
        .err()
        .expect("must fail");
        let names: Vec<(&str, &str)> = err
            .issues
            .iter()
            .map(|i| {
                let kind = match i {
                    ResourceIssue::DuplicateTool { .. } => "dup_tool",
                    ResourceIssue::DuplicateResource { .. } => "dup_resource",
                    ResourceIssue::Unmatched { .. } => "unmatched",
                    ResourceIssue::Missing { .. } => "missing",
                    ResourceIssue::InvalidPayload { .. } => "invalid",
                };
                (kind, i.name())
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("dup_tool", "a"),
                ("dup_resource", "a"),
                ("unmatched", "zzz"),
                ("missing", "b"),
            ]
        );
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("Lenient".parse::<MissingResourcePolicy>(), Ok(MissingResourcePolicy::Lenient));
        assert_eq!(" strict ".parse::<MissingResourcePolicy>(), Ok(MissingResourcePolicy::Strict));
        assert!("loose".parse::<MissingResourcePolicy>().is_err());
    }

    proptest! {
        #[test]
        fn every_covered_tool_gets_exactly_one_resource(
            names in prop::collection::btree_set("[a-z]{1,6}", 0..8),
            mask in any::<u8>(),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let tools: Vec<Tool> = names.iter().map(|n| tool(n, ToolType::CortexSearch)).collect();
            let covered: Vec<&String> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| n)
                .collect();
            let entries: Vec<RawToolResource> = covered
                .iter()
                .map(|n| {
                    let mut payload = Map::new();
                    payload.insert("search_service".into(), json!("svc"));
                    RawToolResource { name: (*n).clone(), payload }
                })
                .collect();

            let lenient = resolve(&entries, &tools, &schemas(), MissingResourcePolicy::Lenient);
            prop_assert_eq!(lenient.map(|m| m.len()).ok(), Some(covered.len()));

            match resolve(&entries, &tools, &schemas(), MissingResourcePolicy::Strict) {
                Ok(map) => {
                    prop_assert_eq!(map.len(), names.len());
                    prop_assert!(names.iter().all(|n| map.contains_key(n)));
                }
                Err(err) => {
                    prop_assert_eq!(err.issues.len(), names.len() - covered.len());
                    let all_missing = err
                        .issues
                        .iter()
                        .all(|i| matches!(i, ResourceIssue::Missing { .. }));
                    prop_assert!(all_missing);
                }
            }
        }
    }
}
