//! Spindle - Main entry point

use anyhow::Result;
use clap::{Parser, ValueEnum};
use spindle_core::SpindleConfig;
use spindle_telemetry::init_logging;
use spindle_worker::{ConsoleReporter, Coordinator, Model};
use std::path::PathBuf;
use tracing::{info, warn};

/// Which coordination model to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelArg {
    /// Explicit worker handles
    Handles,
    /// Worker pool dispatch
    Pool,
    /// Handles first, then pool
    Both,
}

impl ModelArg {
    fn models(self) -> &'static [Model] {
        match self {
            ModelArg::Handles => &[Model::Handles],
            ModelArg::Pool => &[Model::Pool],
            ModelArg::Both => &[Model::Handles, Model::Pool],
        }
    }
}

/// Spindle - Runs a cancellable series and a directory survey side by side
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "SPINDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Coordination model
    #[arg(short, long, value_enum, default_value_t = ModelArg::Both, env = "SPINDLE_MODEL")]
    model: ModelArg,

    /// Directory to survey
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Countdown start value before the series is cancelled
    #[arg(long)]
    countdown: Option<u64>,

    /// Number of pool threads
    #[arg(short = 'n', long)]
    pool_size: Option<usize>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the run reports as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration, then let CLI args win
    let mut config = SpindleConfig::load(args.config.as_ref())?;
    if let Some(root) = args.root {
        config.survey.root = root;
    }
    if let Some(countdown) = args.countdown {
        config.coordinator.countdown = countdown;
    }
    if let Some(pool_size) = args.pool_size {
        config.pool.size = pool_size;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if let Some(log_file) = args.log_file {
        config.logging.log_file = Some(log_file);
    }

    init_logging(&config.logging)?;

    info!("Starting spindle v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Loaded configuration from {}", path.display());
    }
    info!("Survey root: {}", config.survey.root.display());

    let coordinator = Coordinator::new(config)?;
    let reporter = if args.json {
        ConsoleReporter::stderr()
    } else {
        ConsoleReporter::new()
    };

    let models = args.model.models();
    let run = async {
        let mut reports = Vec::new();
        for model in models {
            reports.push(coordinator.run(*model, &reporter).await?);
        }
        Ok::<_, spindle_core::Error>(reports)
    };

    // dropping the run cancels its series worker and joins its threads
    let reports = tokio::select! {
        reports = run => reports?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, abandoning the run");
            anyhow::bail!("interrupted");
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    Ok(())
}
