//! Tracing subscriber setup.
//!
//! Logs go to stderr (stdout carries rendered agents) and optionally to a
//! daily-rolling file. Env flags win over the `[logging]` config section.

use std::path::{Path, PathBuf};

use env_flags::env_flags;
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingCfg;

env_flags! {
    /// Tracing filter, e.g. "info", "debug", or targets format.
    RUST_LOG: &str = "info";
    /// Preferred filter env. If set, overrides RUST_LOG.
    TRACING_FILTER: &str = "";
    /// Pretty formatting (ignored if TRACING_JSON or TRACING_COMPACT is set).
    TRACING_PRETTY: bool = false;
    /// Compact single-line formatting (ignored if TRACING_JSON=true).
    TRACING_COMPACT: bool = true;
    /// JSON formatting.
    TRACING_JSON: bool = false;
    /// Also log to a daily file under <home>/logs or LOG_DIR.
    LOG_TO_FILE: bool = false;
    /// Explicit log directory.
    LOG_DIR: &str = "";
}

const LOG_FILE_PREFIX: &str = "cortex-intake.log";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    Json,
    Compact,
    Pretty,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub style: LogStyle,
    pub to_file: bool,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
struct LogFlags {
    filter: String,
    json: bool,
    compact: bool,
    pretty: bool,
    to_file: bool,
    dir: Option<PathBuf>,
}

impl LogFlags {
    fn from_env() -> Self {
        let filter = if !(*TRACING_FILTER).is_empty() {
            (*TRACING_FILTER).to_string()
        } else {
            (*RUST_LOG).to_string()
        };
        Self {
            filter,
            json: *TRACING_JSON,
            compact: *TRACING_COMPACT,
            pretty: *TRACING_PRETTY,
            to_file: *LOG_TO_FILE,
            dir: (!(*LOG_DIR).is_empty()).then(|| PathBuf::from(*LOG_DIR)),
        }
    }

    /// Config values fill in for flags whose variable is not set.
    fn layered(mut self, cfg: Option<&LoggingCfg>, env_set: impl Fn(&str) -> bool) -> LogSettings {
        if let Some(cfg) = cfg {
            if !(env_set("TRACING_FILTER") || env_set("RUST_LOG"))
                && let Some(level) = cfg.level.as_ref()
            {
                self.filter = level.clone();
            }
            if !env_set("TRACING_JSON")
                && let Some(v) = cfg.json
            {
                self.json = v;
            }
            if !env_set("TRACING_COMPACT")
                && let Some(v) = cfg.compact
            {
                self.compact = v;
            }
            if !env_set("TRACING_PRETTY")
                && let Some(v) = cfg.pretty
            {
                self.pretty = v;
            }
            if !env_set("LOG_TO_FILE")
                && let Some(v) = cfg.to_file
            {
                self.to_file = v;
            }
            if !env_set("LOG_DIR")
                && let Some(dir) = cfg.dir.as_deref()
            {
                self.dir = Some(crate::config::expand_home(dir));
            }
        }
        let style = if self.json {
            LogStyle::Json
        } else if self.compact {
            LogStyle::Compact
        } else if self.pretty {
            LogStyle::Pretty
        } else {
            LogStyle::Full
        };
        LogSettings {
            filter: self.filter,
            style,
            to_file: self.to_file,
            dir: self.dir,
        }
    }
}

/// Resolve settings from env flags and the optional `[logging]` section.
pub fn log_settings(cfg: Option<&LoggingCfg>) -> LogSettings {
    LogFlags::from_env().layered(cfg, |k| std::env::var_os(k).is_some())
}

fn fmt_layer<W>(style: LogStyle, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);
    match style {
        LogStyle::Json => base.json().boxed(),
        LogStyle::Compact => base.compact().boxed(),
        LogStyle::Pretty => base.pretty().boxed(),
        LogStyle::Full => base.boxed(),
    }
}

/// Install the global subscriber. Calling it twice keeps the first one.
pub fn init_tracing(home: &Path, settings: &LogSettings) {
    let filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(settings.style, true, std::io::stderr)];
    let mut dir_error = None;
    if settings.to_file {
        let dir = settings.dir.clone().unwrap_or_else(|| home.join("logs"));
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
                let (nb, guard) = tracing_appender::non_blocking(appender);
                let _ = FILE_GUARD.set(guard);
                layers.push(fmt_layer(settings.style, false, nb));
            }
            Err(e) => dir_error = Some((dir, e)),
        }
    }

    if let Err(e) = tracing_subscriber::registry().with(layers).with(filter).try_init() {
        tracing::debug!("tracing already set: {:?}", e);
    }
    if let Some((dir, e)) = dir_error {
        tracing::warn!("failed to create log dir {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> LogFlags {
        LogFlags {
            filter: "info".into(),
            compact: true,
            ..LogFlags::default()
        }
    }

    #[test]
    fn config_fills_unset_env() {
        let cfg = LoggingCfg {
            level: Some("debug".into()),
            json: Some(true),
            to_file: Some(true),
            dir: Some("/var/log/intake".into()),
            ..LoggingCfg::default()
        };
        let s = flags().layered(Some(&cfg), |_| false);
        assert_eq!(
            s,
            LogSettings {
                filter: "debug".into(),
                style: LogStyle::Json,
                to_file: true,
                dir: Some(PathBuf::from("/var/log/intake")),
            }
        );
    }

    #[test]
    fn env_wins_over_config() {
        let cfg = LoggingCfg {
            level: Some("trace".into()),
            json: Some(true),
            ..LoggingCfg::default()
        };
        let s = flags().layered(Some(&cfg), |k| k == "RUST_LOG" || k == "TRACING_JSON");
        assert_eq!(s.filter, "info");
        assert_eq!(s.style, LogStyle::Compact);
    }

    #[test]
    fn style_falls_back_to_full() {
        let s = LogFlags {
            compact: false,
            ..flags()
        }
        .layered(None, |_| false);
        assert_eq!(s.style, LogStyle::Full);
    }
}
