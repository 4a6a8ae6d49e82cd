//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the logger registry and install the subscriber
//! - Apply the one-shot environment override
//! - Start one level watcher per watched logger
//! - Start the span exporter, metrics endpoint, and pipeline
//! - Wait for a termination signal or a fatal watcher failure, then stop
//!   everything in order
//!
//! # Design Decisions
//! - Fail fast: any startup error is returned before the pipeline runs
//! - Watchers start after the env override, so mounted files win
//! - Watcher failures after startup are fatal too; the process stops

use std::io;
use std::net::{AddrParseError, SocketAddr};

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing_subscriber::util::TryInitError;

use crate::config::loader::ConfigError;
use crate::config::{AppConfig, LevelSources, LevelWatcher, LoggingConfig, WatchError};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::logging::init_logging;
use crate::observability::tracing::{spawn_batch_exporter, LogExporter, SpanBuffer, SpanRecorder};
use crate::observability::{level_from_env, metrics, LoggerRegistry, ParseSeverityError};
use crate::pipeline::{Pipeline, PipelineError};

/// Anything that stops the process.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid {var} override: {source}")]
    EnvOverride {
        var: String,
        #[source]
        source: ParseSeverityError,
    },

    #[error("failed to install log subscriber: {0}")]
    Logging(#[from] TryInitError),

    #[error("invalid metrics address {address}: {source}")]
    MetricsAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("failed to register signal handlers: {0}")]
    Signal(#[source] io::Error),

    #[error("background task panicked: {0}")]
    TaskPanicked(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Register every watched logger and apply the environment override.
pub fn build_registry(config: &LoggingConfig) -> Result<LoggerRegistry, StartupError> {
    let registry = LoggerRegistry::new(config.default_level);
    for name in &config.watched {
        registry.logger(name);
    }

    let level = level_from_env(&config.env_override).map_err(|source| StartupError::EnvOverride {
        var: config.env_override.clone(),
        source,
    })?;
    if let Some(level) = level {
        registry.set_all(level);
    }
    Ok(registry)
}

/// Start one watcher per watched logger.
///
/// Returns an empty set when no level path is configured. Every watcher
/// has applied the mounted level by the time this returns.
pub fn start_watchers(
    config: &LoggingConfig,
    registry: &LoggerRegistry,
    shutdown: &Shutdown,
) -> Result<JoinSet<Result<(), WatchError>>, StartupError> {
    let mut watchers = JoinSet::new();
    let Some(level_path) = &config.level_path else {
        tracing::info!("No level path configured, log levels are static");
        return Ok(watchers);
    };

    let mut sources = LevelSources::new(level_path);
    if let Some(path) = &config.debug_modules_path {
        sources = sources.with_debug_modules(path);
    }

    let mut handles = Vec::with_capacity(config.watched.len());
    for name in &config.watched {
        let started = LevelWatcher::new(sources.clone(), registry.logger(name))
            .with_allowlist(config.allowlist_scope.applies_to(name))
            .with_settle(config.settle())
            .start(shutdown.subscribe());
        match started {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                // Watchers started so far would otherwise outlive the failure.
                for handle in &handles {
                    handle.abort();
                }
                return Err(e.into());
            }
        }
    }

    // The inner handles only exist to surface panics through the set.
    for handle in handles {
        watchers.spawn(async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Ok(()),
            }
        });
    }
    Ok(watchers)
}

/// Run the service until it is told to stop or a watcher fails.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    let registry = build_registry(&config.logging)?;

    let spans = SpanBuffer::new();
    let recorder = config.tracing.enabled.then(|| SpanRecorder::new(spans.clone()));
    init_logging(&config.logging, &registry, recorder)?;

    tracing::info!(
        loggers = ?registry.names(),
        default_level = %config.logging.default_level,
        "levelwatch starting"
    );

    let shutdown = Shutdown::new();
    let mut watchers = start_watchers(&config.logging, &registry, &shutdown)?;

    let exporter = config.tracing.enabled.then(|| {
        spawn_batch_exporter(
            spans,
            LogExporter,
            config.tracing.flush_interval(),
            config.tracing.max_batch,
            shutdown.subscribe(),
        )
    });

    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .address
            .parse()
            .map_err(|source| StartupError::MetricsAddress {
                address: config.metrics.address.clone(),
                source,
            })?;
        metrics::init_metrics(addr)?;
        for name in registry.names() {
            metrics::record_log_level(&name, registry.logger(&name).level());
        }
    }

    let pipeline = Pipeline::simulated(config.pipeline.clone()).start(&shutdown);

    let termination = signals::wait_for_termination();
    tokio::pin!(termination);

    let fatal = loop {
        tokio::select! {
            received = &mut termination => match received {
                Ok(signal) => {
                    tracing::info!(signal, "Received termination signal, initiating graceful shutdown");
                    break None;
                }
                Err(e) => break Some(StartupError::Signal(e)),
            },
            Some(joined) = watchers.join_next(), if !watchers.is_empty() => match joined {
                Ok(Ok(())) => tracing::debug!("Log level watcher exited"),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Log level watcher failed");
                    break Some(StartupError::Watch(e));
                }
                Err(e) => break Some(StartupError::TaskPanicked(e.to_string())),
            },
        }
    };

    shutdown.trigger();

    while let Some(joined) = watchers.join_next().await {
        if let Ok(Err(e)) = joined {
            tracing::warn!(error = %e, "Log level watcher failed during shutdown");
        }
    }

    let drained = pipeline.join().await;

    if let Some(exporter) = exporter {
        if let Err(e) = exporter.await {
            tracing::warn!(error = %e, "Span exporter did not stop cleanly");
        }
    }

    if let Some(e) = fatal {
        return Err(e);
    }
    drained?;

    tracing::info!("Shutdown complete");
    Ok(())
}
