//! Configuration structures for spindle

use serde::{Deserialize, Serialize};
use spindle_telemetry::LoggingConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Main configuration for a spindle run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpindleConfig {
    /// Series worker configuration
    #[serde(default)]
    pub series: SeriesConfig,

    /// Survey worker configuration
    #[serde(default)]
    pub survey: SurveyConfig,

    /// Coordinator timing
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub pool: PoolConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SpindleConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Merge configuration from file and environment
    pub fn load(path: Option<impl AsRef<Path>>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        // env vars take precedence
        config.apply_env()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("SPINDLE_SURVEY_ROOT") {
            self.survey.root = PathBuf::from(root);
        }
        if let Some(size) = env_number("SPINDLE_POOL_SIZE")? {
            self.pool.size = size as usize;
        }
        if let Some(countdown) = env_number("SPINDLE_COUNTDOWN")? {
            self.coordinator.countdown = countdown;
        }
        if let Some(batch_size) = env_number("SPINDLE_BATCH_SIZE")? {
            self.series.batch_size = batch_size;
        }
        if let Some(min_iterations) = env_number("SPINDLE_MIN_ITERATIONS")? {
            self.series.min_iterations = min_iterations;
        }
        if let Ok(level) = std::env::var("SPINDLE_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Reject values that would make a run hang or divide by zero
    pub fn validate(&self) -> Result<()> {
        if self.series.batch_size == 0 {
            return Err(Error::Configuration(
                "series.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.survey.chunk_size == 0 {
            return Err(Error::Configuration(
                "survey.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.pool.size == 0 {
            return Err(Error::Configuration(
                "pool.size must be greater than 0".to_string(),
            ));
        }
        if self.coordinator.poll_interval_ms == 0 {
            return Err(Error::Configuration(
                "coordinator.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("{} is not a number: {}", name, value))),
        Err(_) => Ok(None),
    }
}

/// Series worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Cancellation is only checked every `batch_size` iterations
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Cancellation is ignored until this many iterations have run
    #[serde(default = "default_min_iterations")]
    pub min_iterations: u64,

    /// Allowed distance from e before the worker logs a warning
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_batch_size() -> u64 {
    1000
}

fn default_min_iterations() -> u64 {
    1_000_000
}

fn default_tolerance() -> f64 {
    1e-9
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            min_iterations: default_min_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Survey worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    /// Directory to survey
    #[serde(default = "default_survey_root")]
    pub root: PathBuf,

    /// Read size used while hashing
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_survey_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_chunk_size() -> usize {
    4096
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            root: default_survey_root(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Coordinator timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Countdown start value before cancellation is requested
    #[serde(default = "default_countdown")]
    pub countdown: u64,

    /// Time between countdown steps in milliseconds
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u64,

    /// Bounded wait used while polling a naturally-terminating worker
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_countdown() -> u64 {
    4
}

fn default_countdown_tick_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            countdown: default_countdown(),
            countdown_tick_ms: default_countdown_tick_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CoordinatorConfig {
    /// Time between countdown steps
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    /// Bounded wait for each poll
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of reusable execution contexts
    #[serde(default = "default_pool_size")]
    pub size: usize,
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
        }
    }
}
