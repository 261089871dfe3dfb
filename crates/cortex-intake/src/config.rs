//! User configuration (`<home>/config.toml`) and settings resolution.
//!
//! Every intake setting is resolved as: command-line flag, then environment
//! variable, then config file, then built-in default.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::model::CreateMode;
use crate::resolve::MissingResourcePolicy;

pub const HOME_ENV: &str = "CORTEX_INTAKE_HOME";
pub const BASE_URL_ENV: &str = "CORTEX_INTAKE_BASE_URL";
pub const MISSING_RESOURCES_ENV: &str = "CORTEX_INTAKE_MISSING_RESOURCES";
pub const CREATE_MODE_ENV: &str = "CORTEX_INTAKE_CREATE_MODE";
pub const MAX_CONCURRENCY_ENV: &str = "CORTEX_INTAKE_MAX_CONCURRENCY";

const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    pub logging: Option<LoggingCfg>,
    pub intake: Option<IntakeCfg>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingCfg {
    pub to_file: Option<bool>,
    pub dir: Option<String>,
    pub json: Option<bool>,
    pub compact: Option<bool>,
    pub pretty: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeCfg {
    pub missing_resources: Option<MissingResourcePolicy>,
    pub create_mode: Option<CreateMode>,
    pub base_url: Option<String>,
    pub output_dir: Option<String>, // `~/` is expanded
    pub max_concurrency: Option<usize>,
}

/// `$CORTEX_INTAKE_HOME`, else `$HOME/.cortex-intake`.
pub fn intake_home() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.trim().is_empty()
    {
        return expand_home(&home);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".cortex-intake"),
        Err(_) => PathBuf::from(".cortex-intake"),
    }
}

pub fn load_user_config(home: &Path) -> anyhow::Result<Option<UserConfig>> {
    let path = home.join("config.toml");
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: UserConfig = toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(cfg))
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

/// Intake settings given on the command line; `None` defers to lower layers.
#[derive(Debug, Default, Clone)]
pub struct IntakeFlags {
    pub missing_resources: Option<MissingResourcePolicy>,
    pub create_mode: Option<CreateMode>,
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub max_concurrency: Option<usize>,
}

/// Effective intake settings after layering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeSettings {
    pub missing_resources: MissingResourcePolicy,
    pub create_mode: CreateMode,
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub max_concurrency: usize,
}

impl IntakeSettings {
    /// `env` looks up an environment variable; pass `|k| std::env::var(k).ok()`
    /// outside tests.
    pub fn resolve(
        flags: &IntakeFlags,
        env: impl Fn(&str) -> Option<String>,
        cfg: Option<&IntakeCfg>,
    ) -> anyhow::Result<Self> {
        let env_var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let missing_resources = match (flags.missing_resources, env_var(MISSING_RESOURCES_ENV)) {
            (Some(p), _) => p,
            (None, Some(v)) => v
                .parse::<MissingResourcePolicy>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("{MISSING_RESOURCES_ENV}={v}"))?,
            (None, None) => cfg.and_then(|c| c.missing_resources).unwrap_or_default(),
        };

        let create_mode = match (flags.create_mode, env_var(CREATE_MODE_ENV)) {
            (Some(m), _) => m,
            (None, Some(v)) => v
                .parse::<CreateMode>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("{CREATE_MODE_ENV}={v}"))?,
            (None, None) => cfg.and_then(|c| c.create_mode).unwrap_or_default(),
        };

        let base_url = flags
            .base_url
            .clone()
            .or_else(|| env_var(BASE_URL_ENV))
            .or_else(|| cfg.and_then(|c| c.base_url.clone()));

        let output_dir = flags
            .output_dir
            .clone()
            .or_else(|| cfg.and_then(|c| c.output_dir.as_deref()).map(expand_home));

        let max_concurrency = match (flags.max_concurrency, env_var(MAX_CONCURRENCY_ENV)) {
            (Some(n), _) => n,
            (None, Some(v)) => v
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{MAX_CONCURRENCY_ENV}={v}"))?,
            (None, None) => cfg
                .and_then(|c| c.max_concurrency)
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
        };
        if max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }

        Ok(Self {
            missing_resources,
            create_mode,
            base_url,
            output_dir,
            max_concurrency,
        })
    }
}
