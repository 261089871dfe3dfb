//! Outbound rendering of assembled agents.
//!
//! A sink turns a `CortexAgent` into what the agent service consumes and
//! writes it somewhere. The shipped sinks never open a connection: they
//! print, or write one file per agent under an output directory.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use url::Url;

use crate::model::{CortexAgent, CreateMode, safe_name};

/// Where a sink's output went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReceipt {
    pub agent: String,
    pub destination: String,
}

#[async_trait]
pub trait AgentSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Render and deliver one agent. Errors are delivery or rendering failures.
    async fn emit(&self, agent: &CortexAgent) -> anyhow::Result<SinkReceipt>;
}

/// Output target shared by the shipped sinks.
#[derive(Debug)]
pub enum Destination {
    Stdout(Mutex<()>),
    Directory {
        root: PathBuf,
        /// File written so far -> agent that claimed it.
        claimed: Mutex<HashMap<PathBuf, String>>,
    },
}

impl Destination {
    pub fn stdout() -> Self {
        Destination::Stdout(Mutex::new(()))
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Destination::Directory {
            root: path.into(),
            claimed: Mutex::new(HashMap::new()),
        }
    }

    async fn deliver(&self, agent: &CortexAgent, extension: &str, text: &str) -> anyhow::Result<SinkReceipt> {
        let qualified = agent.qualified_name();
        match self {
            Destination::Stdout(lock) => {
                // One agent at a time so concurrent documents do not interleave.
                let _guard = lock.lock().await;
                let mut out = tokio::io::stdout();
                out.write_all(text.as_bytes()).await?;
                if !text.ends_with('\n') {
                    out.write_all(b"\n").await?;
                }
                out.flush().await?;
                Ok(SinkReceipt {
                    agent: qualified,
                    destination: "stdout".to_string(),
                })
            }
            Destination::Directory { root, claimed } => {
                let path = root.join(format!("{}.{extension}", safe_name(&qualified)));
                {
                    // File names fold case and punctuation, so distinct agents can collide.
                    let mut claimed = claimed.lock().await;
                    if let Some(owner) = claimed.get(&path) {
                        bail!(
                            "{} would overwrite {}, already written for {}",
                            qualified,
                            path.display(),
                            owner
                        );
                    }
                    claimed.insert(path.clone(), qualified.clone());
                }
                tokio::fs::create_dir_all(root)
                    .await
                    .with_context(|| format!("creating output directory {}", root.display()))?;
                tokio::fs::write(&path, text)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::debug!("wrote {} to {}", qualified, path.display());
                Ok(SinkReceipt {
                    agent: qualified,
                    destination: path.display().to_string(),
                })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not serialize agent: {0}")]
    Json(#[from] serde_json::Error),
    #[error("agent specification contains '$$' and cannot be dollar-quoted")]
    DollarQuote,
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

/// REST endpoint that creates agents in `database.schema`.
///
/// The scheme is always https. Identifiers are percent-encoded as path segments.
pub fn create_endpoint(
    base_url: &str,
    database: &str,
    schema: &str,
    mode: CreateMode,
) -> Result<String, url::ParseError> {
    let host = match base_url.split_once("://") {
        Some((_, rest)) => rest,
        None => base_url,
    };
    let mut url = Url::parse(&format!("https://{}", host.trim_end_matches('/')))?;
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(["api", "v2", "databases", database, "schemas", schema, "agents"]);
    url.query_pairs_mut().append_pair("createMode", mode.as_str());
    Ok(url.into())
}

/// Writes the REST create-request for each agent as JSON:
/// `{"method", "endpoint", "body"}`. The endpoint is null without a base URL.
#[derive(Debug)]
pub struct JsonBodySink {
    base_url: Option<String>,
    mode: CreateMode,
    destination: Destination,
}

impl JsonBodySink {
    pub fn new(base_url: Option<String>, mode: CreateMode, destination: Destination) -> Self {
        Self {
            base_url,
            mode,
            destination,
        }
    }

    pub fn render(&self, agent: &CortexAgent) -> Result<String, RenderError> {
        let endpoint = self
            .base_url
            .as_deref()
            .map(|base| create_endpoint(base, &agent.database_name, &agent.schema_name, self.mode))
            .transpose()?;
        let envelope = json!({
            "method": "POST",
            "endpoint": endpoint,
            "body": agent.request_body()?,
        });
        Ok(serde_json::to_string_pretty(&envelope)?)
    }
}

#[async_trait]
impl AgentSink for JsonBodySink {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn emit(&self, agent: &CortexAgent) -> anyhow::Result<SinkReceipt> {
        let text = self.render(agent)?;
        self.destination.deliver(agent, "json", &text).await
    }
}

/// Writes one `CREATE AGENT` statement per agent.
#[derive(Debug)]
pub struct SqlSink {
    mode: CreateMode,
    destination: Destination,
}

impl SqlSink {
    pub fn new(mode: CreateMode, destination: Destination) -> Self {
        Self { mode, destination }
    }
}

#[async_trait]
impl AgentSink for SqlSink {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn emit(&self, agent: &CortexAgent) -> anyhow::Result<SinkReceipt> {
        let text = render_create_statement(agent, self.mode)?;
        self.destination.deliver(agent, "sql", &text).await
    }
}

fn quote_literal(text: &str) -> String {
    text.replace('\'', "''")
}

/// Unquoted identifiers pass through; anything else is double-quoted.
fn quote_identifier(ident: &str) -> String {
    let mut chars = ident.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if simple {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Render a `CREATE AGENT` statement whose specification is dollar-quoted JSON.
pub fn render_create_statement(agent: &CortexAgent, mode: CreateMode) -> Result<String, RenderError> {
    let head = match mode {
        CreateMode::OrReplace => "CREATE OR REPLACE AGENT",
        CreateMode::ErrorIfExists => "CREATE AGENT",
        CreateMode::IfNotExists => "CREATE AGENT IF NOT EXISTS",
    };
    let spec = serde_json::to_string_pretty(&agent.specification()?)?;
    if spec.contains("$$") {
        return Err(RenderError::DollarQuote);
    }

    let target = [&agent.database_name, &agent.schema_name, &agent.name]
        .map(|ident| quote_identifier(ident))
        .join(".");
    let mut lines = vec![format!("{head} {target}")];
    if let Some(comment) = agent.comment.as_deref().filter(|c| !c.is_empty()) {
        lines.push(format!("  COMMENT = '{}'", quote_literal(comment)));
    }
    if let Some(profile) = &agent.profile {
        let compact = serde_json::to_string(profile)?;
        lines.push(format!("  PROFILE = '{}'", quote_literal(&compact)));
    }
    lines.push("  FROM SPECIFICATION".to_string());
    lines.push("  $$".to_string());
    lines.push(spec);
    lines.push("  $$;".to_string());
    Ok(lines.join("\n"))
}
