use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};

use cortex_intake::batch::{BatchContext, find_documents, run_batch};
use cortex_intake::config::{IntakeFlags, IntakeSettings, UserConfig, intake_home, load_user_config};
use cortex_intake::logging::{init_tracing, log_settings};
use cortex_intake::report::{render_batch_summary, render_failure};
use cortex_intake::resolve::MissingResourcePolicy;
use cortex_intake::sink::{AgentSink, Destination, JsonBodySink, SqlSink};
use cortex_intake::{CreateMode, Overrides, Pipeline, PipelineOptions, SchemaStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// REST create-request body plus endpoint.
    Json,
    /// `CREATE AGENT ... FROM SPECIFICATION` statement.
    Sql,
}

/// Validate Cortex agent documents and render their create requests.
#[derive(Debug, Parser)]
#[command(name = "cortex-intake", version)]
struct Cli {
    /// Agent documents (.json, .yaml/.yml, .toml).
    files: Vec<PathBuf>,
    /// Also process every supported document in this directory.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Replace `database_name` in every document.
    #[arg(long)]
    database: Option<String>,
    /// Replace `schema_name` in every document.
    #[arg(long)]
    schema: Option<String>,
    /// Replace `name` in every document.
    #[arg(long)]
    name: Option<String>,
    /// errorIfExists, orReplace or ifNotExists.
    #[arg(long)]
    create_mode: Option<CreateMode>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    /// Write one file per agent here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Validate and resolve only; render nothing.
    #[arg(long)]
    check: bool,
    /// Account host used to build REST endpoints.
    #[arg(long)]
    base_url: Option<String>,
    /// strict or lenient handling of tools without a tool resource.
    #[arg(long)]
    missing_resources: Option<MissingResourcePolicy>,
    #[arg(long)]
    max_concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let home = intake_home();
    let (user_cfg, cfg_error) = match load_user_config(&home) {
        Ok(cfg) => (cfg, None),
        Err(e) => (None, Some(e)),
    };
    init_tracing(
        &home,
        &log_settings(user_cfg.as_ref().and_then(|c| c.logging.as_ref())),
    );
    if let Some(e) = cfg_error {
        tracing::warn!("ignoring user config in {}: {:#}", home.display(), e);
    }

    match run(cli, user_cfg).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// True when every document succeeded.
async fn run(cli: Cli, user_cfg: Option<UserConfig>) -> anyhow::Result<bool> {
    let flags = IntakeFlags {
        missing_resources: cli.missing_resources,
        create_mode: cli.create_mode,
        base_url: cli.base_url.clone(),
        output_dir: cli.out.clone(),
        max_concurrency: cli.max_concurrency,
    };
    let settings = IntakeSettings::resolve(
        &flags,
        |k| std::env::var(k).ok(),
        user_cfg.as_ref().and_then(|c| c.intake.as_ref()),
    )?;
    tracing::debug!("effective settings: {:?}", settings);

    let mut files = cli.files;
    if let Some(dir) = &cli.dir {
        files.extend(find_documents(dir).await?);
    }
    if files.is_empty() {
        bail!("no input documents: pass FILES or --dir");
    }

    let store = Arc::new(SchemaStore::embedded().context("compiling embedded schema")?);
    let pipeline = Pipeline::new(
        store,
        PipelineOptions {
            missing_resources: settings.missing_resources,
        },
    )
    .context("preparing pipeline")?;

    let sink: Option<Arc<dyn AgentSink>> = if cli.check {
        None
    } else {
        let destination = match &settings.output_dir {
            Some(dir) => Destination::directory(dir),
            None => Destination::stdout(),
        };
        let sink: Arc<dyn AgentSink> = match cli.format {
            OutputFormat::Json => Arc::new(JsonBodySink::new(
                settings.base_url.clone(),
                settings.create_mode,
                destination,
            )),
            OutputFormat::Sql => Arc::new(SqlSink::new(settings.create_mode, destination)),
        };
        Some(sink)
    };

    let ctx = BatchContext {
        pipeline: Arc::new(pipeline),
        sink,
        overrides: Arc::new(Overrides {
            database_name: cli.database,
            schema_name: cli.schema,
            name: cli.name,
        }),
        max_concurrency: settings.max_concurrency,
    };
    let report = run_batch(&ctx, files).await;

    for doc in report.failed() {
        if let Err(failure) = &doc.outcome {
            eprintln!("{}", render_failure(&doc.path.display().to_string(), failure));
        }
    }
    eprint!("{}", render_batch_summary(&report));
    Ok(report.all_succeeded())
}
