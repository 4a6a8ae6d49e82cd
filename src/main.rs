//! levelwatch
//!
//! Runs a producer/consumer pipeline whose per-module log levels follow a
//! mounted file.
//!
//! # Architecture Overview
//!
//! ```text
//!   /conf/log_level ──────────┐
//!   /conf/log_debug_modules ──┤
//!                             ▼
//!                     ┌──────────────┐   set_level   ┌────────────────┐
//!                     │ LevelWatcher │──────────────▶│ LoggerRegistry │
//!                     │ (per logger) │               └───────┬────────┘
//!                     └──────────────┘                       │ RegistryFilter
//!                                                            ▼
//!   ┌───────────┐   rendezvous   ┌───────────┐        ┌──────────────┐
//!   │ producers │───────────────▶│ consumers │──logs─▶│  fmt layer   │
//!   └───────────┘     queue      └─────┬─────┘        └──────────────┘
//!                                      │ spans
//!                                      ▼
//!                               ┌──────────────┐     ┌───────────────┐
//!                               │ SpanRecorder │────▶│ batch exporter│
//!                               └──────────────┘     └───────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use levelwatch::config::loader::{load_with_overrides, ConfigError};
use levelwatch::config::AppConfig;
use levelwatch::lifecycle::{self, StartupError};

#[derive(Parser)]
#[command(name = "levelwatch")]
#[command(about = "Worker pipeline with live-reloadable log levels", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File holding the log level.
    #[arg(long)]
    level_path: Option<PathBuf>,

    /// File holding the comma-separated debug allow-list.
    #[arg(long)]
    debug_modules_path: Option<PathBuf>,

    /// Keep the configured levels; do not read or watch any file.
    #[arg(long, conflicts_with_all = ["level_path", "debug_modules_path"])]
    no_watch: bool,

    /// Number of producer tasks.
    #[arg(long)]
    producers: Option<usize>,

    /// Number of consumer tasks.
    #[arg(long)]
    consumers: Option<usize>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.level_path {
            config.logging.level_path = Some(path.clone());
        }
        if let Some(path) = &self.debug_modules_path {
            config.logging.debug_modules_path = Some(path.clone());
        }
        if self.no_watch {
            config.logging.level_path = None;
            config.logging.debug_modules_path = None;
        }
        if let Some(producers) = self.producers {
            config.pipeline.producers = producers;
        }
        if let Some(consumers) = self.consumers {
            config.pipeline.consumers = consumers;
        }
    }
}

fn configure(cli: &Cli) -> Result<AppConfig, ConfigError> {
    load_with_overrides(cli.config.as_deref(), |config| cli.apply(config))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match configure(&cli) {
        Ok(config) => lifecycle::run(config).await,
        Err(e) => Err(StartupError::from(e)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("levelwatch: {e}");
            ExitCode::FAILURE
        }
    }
}
