//! Concurrent processing of many documents.
//!
//! Documents are read with `tokio::fs` and run through the shared pipeline in
//! a `JoinSet` that never holds more than `max_concurrency` tasks. Reports
//! come back in input order regardless of completion order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::extract::is_supported;
use crate::pipeline::{Overrides, Pipeline, PipelineError};
use crate::sink::{AgentSink, SinkReceipt};

/// Supported documents directly inside `dir`, sorted by file name.
pub async fn find_documents(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading directory {}", dir.display()))?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_supported(&path) {
            continue;
        }
        // Follows symlinks; a dangling link is skipped rather than failing the scan.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

#[derive(Debug, Error)]
pub enum DocumentFailure {
    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{sink} sink failed: {error:#}")]
    Sink {
        sink: &'static str,
        error: anyhow::Error,
    },
    #[error("processing task aborted: {0}")]
    Aborted(String),
}

impl DocumentFailure {
    pub fn summary(&self) -> String {
        match self {
            DocumentFailure::Pipeline(e) => e.summary(),
            DocumentFailure::Read { .. } => "document could not be read".to_string(),
            DocumentFailure::Sink { sink, .. } => format!("agent could not be written by the {sink} sink"),
            DocumentFailure::Aborted(_) => "document processing was aborted".to_string(),
        }
    }

    pub fn details(&self) -> Vec<String> {
        match self {
            DocumentFailure::Pipeline(e) => e.details(),
            other => vec![other.to_string()],
        }
    }

    pub fn count(&self) -> usize {
        match self {
            DocumentFailure::Pipeline(e) => e.count(),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSuccess {
    /// `database.schema.name` of the built agent.
    pub agent: String,
    /// Absent when only checking.
    pub receipt: Option<SinkReceipt>,
}

#[derive(Debug)]
pub struct DocumentReport {
    pub path: PathBuf,
    pub outcome: Result<DocumentSuccess, DocumentFailure>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.documents.len()
    }

    pub fn succeeded(&self) -> usize {
        self.documents.iter().filter(|d| d.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| d.outcome.is_err())
    }

    pub fn all_succeeded(&self) -> bool {
        self.documents.iter().all(|d| d.outcome.is_ok())
    }
}

/// Shared inputs for every document in a run.
#[derive(Clone)]
pub struct BatchContext {
    pub pipeline: Arc<Pipeline>,
    /// `None` validates without emitting.
    pub sink: Option<Arc<dyn AgentSink>>,
    pub overrides: Arc<Overrides>,
    pub max_concurrency: usize,
}

pub async fn run_batch(ctx: &BatchContext, files: Vec<PathBuf>) -> BatchReport {
    let run_id = Uuid::new_v4();
    let limit = ctx.max_concurrency.max(1);
    tracing::info!(
        "run {}: processing {} document(s), up to {} at a time",
        run_id,
        files.len(),
        limit
    );

    let paths = files.clone();
    let mut slots: Vec<Option<DocumentReport>> = files.iter().map(|_| None).collect();
    let mut pending = files.into_iter().enumerate();
    let mut set = JoinSet::new();
    let mut join_errors = Vec::new();

    loop {
        while set.len() < limit {
            let Some((idx, path)) = pending.next() else {
                break;
            };
            let span = tracing::info_span!("document", run = %run_id, file = %path.display());
            let task_ctx = ctx.clone();
            set.spawn(
                async move {
                    let outcome = process_document(&task_ctx, &path).await;
                    (idx, DocumentReport { path, outcome })
                }
                .instrument(span),
            );
        }

        match set.join_next().await {
            Some(Ok((idx, report))) => slots[idx] = Some(report),
            Some(Err(e)) => {
                tracing::warn!("document task join error: {}", e);
                join_errors.push(e.to_string());
            }
            None => break,
        }
    }

    // A slot is only empty when its task panicked or was cancelled.
    let reason = join_errors.join("; ");
    let documents: Vec<DocumentReport> = slots
        .into_iter()
        .zip(paths)
        .map(|(slot, path)| {
            slot.unwrap_or_else(|| DocumentReport {
                path,
                outcome: Err(DocumentFailure::Aborted(reason.clone())),
            })
        })
        .collect();
    let report = BatchReport { run_id, documents };
    tracing::info!(
        "run {}: {} of {} document(s) succeeded",
        run_id,
        report.succeeded(),
        report.total()
    );
    report
}

async fn process_document(ctx: &BatchContext, path: &Path) -> Result<DocumentSuccess, DocumentFailure> {
    let bytes = tokio::fs::read(path).await.map_err(|source| DocumentFailure::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path.display().to_string();
    let agent = ctx.pipeline.build_agent(&filename, &bytes, &ctx.overrides)?;
    let receipt = match &ctx.sink {
        Some(sink) => {
            let receipt = sink.emit(&agent).await.map_err(|error| DocumentFailure::Sink {
                sink: sink.name(),
                error,
            })?;
            tracing::info!("{} -> {}", receipt.agent, receipt.destination);
            Some(receipt)
        }
        None => None,
    };
    Ok(DocumentSuccess {
        agent: agent.qualified_name(),
        receipt,
    })
}
