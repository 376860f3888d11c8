//! Structured logging for spindle
//!
//! The coordinator installs a process-global subscriber with [`init_logging`].
//! Worker contexts do not inherit anything implicitly: each worker receives a
//! [`LoggingSnapshot`] taken by the coordinator and calls
//! [`attach_worker_logging`] when it starts executing, which installs an
//! equivalent subscriber as the thread default for the lifetime of the
//! returned guard.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::span::EnteredSpan;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::UtcTime, MakeWriter},
    layer::{Layered, SubscriberExt},
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::{TelemetryError, TelemetryResult};

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync + 'static>;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (json, pretty, compact)
    pub format: LogFormat,

    /// Include span open/close events
    pub include_spans: bool,

    /// Include file/line information
    pub include_location: bool,

    /// Include target (module path)
    pub include_target: bool,

    /// Include thread names
    pub include_thread_names: bool,

    /// Environment filter string (e.g., "spindle_worker=debug,warn")
    pub env_filter: Option<String>,

    /// Write log lines to stderr
    pub console: bool,

    /// Append log lines to this file
    pub log_file: Option<PathBuf>,

    /// Truncate `log_file` when the coordinator initializes logging
    pub truncate_log_file: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable)
    Json,
    /// Pretty format (human-readable, multi-line)
    Pretty,
    /// Compact format (single line)
    #[default]
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" | "text" => Ok(LogFormat::Compact),
            _ => Err(TelemetryError::Config(format!("unknown log format: {}", s))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_spans: false,
            include_location: false,
            include_target: true,
            include_thread_names: true,
            env_filter: None,
            console: true,
            log_file: None,
            truncate_log_file: false,
        }
    }
}

impl LoggingConfig {
    /// Capture this configuration so it can be carried into a worker context
    pub fn snapshot(&self) -> TelemetryResult<LoggingSnapshot> {
        serde_json::to_string(self)
            .map(LoggingSnapshot)
            .map_err(|e| TelemetryError::Snapshot(e.to_string()))
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let directives = self.env_filter.as_deref().unwrap_or(&self.level);
        EnvFilter::try_new(directives).map_err(|e| TelemetryError::Logging(e.to_string()))
    }

    fn layers(&self, truncate: bool) -> TelemetryResult<Vec<BoxedLayer>> {
        let mut layers = Vec::new();

        if self.console {
            layers.push(self.fmt_layer(std::io::stderr, std::io::stderr().is_terminal()));
        }

        if let Some(path) = &self.log_file {
            let file = open_log_file(path, truncate)?;
            layers.push(self.fmt_layer(Mutex::new(file), false));
        }

        Ok(layers)
    }

    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_timer(UtcTime::rfc_3339())
            .with_span_events(span_events)
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_target(self.include_target)
            .with_thread_names(self.include_thread_names);

        match self.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        }
    }
}

fn open_log_file(path: &Path, truncate: bool) -> TelemetryResult<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| TelemetryError::Logging(format!("{}: {}", parent.display(), e)))?;
    }

    let log_error = |e: std::io::Error| TelemetryError::Logging(format!("{}: {}", path.display(), e));

    if truncate {
        File::create(path).map_err(log_error)?;
    }

    // every handle appends, so coordinator and worker lines never overwrite each other
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_error)
}

/// Serialized [`LoggingConfig`], taken by the coordinator and handed to workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSnapshot(String);

impl LoggingSnapshot {
    /// Raw JSON form of the snapshot
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild the configuration the snapshot was taken from
    pub fn restore(&self) -> TelemetryResult<LoggingConfig> {
        serde_json::from_str(&self.0).map_err(|e| TelemetryError::Snapshot(e.to_string()))
    }
}

/// Initialize process-wide logging with configuration
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(config.layers(config.truncate_log_file)?)
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))?;

    tracing::info!(
        "Logging initialized with level: {}, format: {:?}",
        config.level,
        config.format
    );

    Ok(())
}

/// Keeps a worker's logging context installed on the current thread.
///
/// Dropping the guard leaves the worker span and restores whatever
/// subscriber was the thread default before.
pub struct WorkerLogGuard {
    _span: EnteredSpan,
    _default: DefaultGuard,
}

/// Re-establish logging inside a worker context from a coordinator snapshot
pub fn attach_worker_logging(
    snapshot: &LoggingSnapshot,
    worker: &str,
) -> TelemetryResult<WorkerLogGuard> {
    let config = snapshot.restore()?;

    let default = if config.enabled {
        let subscriber = tracing_subscriber::registry()
            .with(config.filter()?)
            .with(config.layers(false)?);
        tracing::subscriber::set_default(subscriber)
    } else {
        tracing::subscriber::set_default(tracing::subscriber::NoSubscriber::default())
    };

    let span = tracing::info_span!("worker", worker = %worker).entered();

    Ok(WorkerLogGuard {
        _span: span,
        _default: default,
    })
}
