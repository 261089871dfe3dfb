use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ToolType;
use crate::unify::Violation;

/// One problem found while joining tools with tool resources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceIssue {
    #[error("tool resource '{name}' does not match any declared tool")]
    Unmatched { name: String },
    #[error("tool '{name}' ({tool_type}) has no tool resource")]
    Missing { name: String, tool_type: ToolType },
    #[error("tool resource '{name}' is not a valid {tool_type} resource: {}", violation_summary(.violations))]
    InvalidPayload {
        name: String,
        tool_type: ToolType,
        /// Rooted at the entry's place in the document, e.g. `tool_resources[1].max_results`.
        violations: Vec<Violation>,
    },
    #[error("tool '{name}' is declared more than once")]
    DuplicateTool { name: String },
    #[error("tool resource '{name}' is given more than once")]
    DuplicateResource { name: String },
}

impl ResourceIssue {
    /// Name of the tool or resource entry the issue is about.
    pub fn name(&self) -> &str {
        match self {
            ResourceIssue::Unmatched { name }
            | ResourceIssue::Missing { name, .. }
            | ResourceIssue::InvalidPayload { name, .. }
            | ResourceIssue::DuplicateTool { name }
            | ResourceIssue::DuplicateResource { name } => name,
        }
    }

    /// One line per payload violation; every other issue is a single line.
    pub fn detail_lines(&self) -> Vec<String> {
        match self {
            ResourceIssue::InvalidPayload {
                name, violations, ..
            } if !violations.is_empty() => violations
                .iter()
                .map(|v| format!("{v} (tool resource '{name}')"))
                .collect(),
            other => vec![other.to_string()],
        }
    }
}

fn violation_summary(violations: &[Violation]) -> String {
    match violations {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} tool resource issue(s){}", .issues.len(), first_issue(.issues))]
pub struct ResolveError {
    pub issues: Vec<ResourceIssue>,
}

impl ResolveError {
    pub fn details(&self) -> Vec<String> {
        self.issues.iter().flat_map(ResourceIssue::detail_lines).collect()
    }

    /// Issues, counting each payload violation separately.
    pub fn count(&self) -> usize {
        self.issues
            .iter()
            .map(|issue| match issue {
                ResourceIssue::InvalidPayload { violations, .. } => violations.len().max(1),
                _ => 1,
            })
            .sum()
    }
}

fn first_issue(issues: &[ResourceIssue]) -> String {
    match issues {
        [] => String::new(),
        [only] => format!(": {only}"),
        [first, rest @ ..] => format!(": {first} (and {} more)", rest.len()),
    }
}

/// What to do with a tool that needs a resource but has none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingResourcePolicy {
    /// Report `ResourceIssue::Missing`.
    #[default]
    Strict,
    /// Warn and leave the tool without a resource.
    Lenient,
}

impl MissingResourcePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingResourcePolicy::Strict => "strict",
            MissingResourcePolicy::Lenient => "lenient",
        }
    }
}

impl fmt::Display for MissingResourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingResourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(MissingResourcePolicy::Strict),
            "lenient" => Ok(MissingResourcePolicy::Lenient),
            other => Err(format!(
                "unknown missing-resource policy '{other}' (expected strict or lenient)"
            )),
        }
    }
}
