//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem
//! - Gate every event on the level of the logger that owns its target
//! - Pick the output format from configuration
//!
//! # Design Decisions
//! - Module loggers are `tracing` targets; call sites use
//!   `tracing::debug!(target: "loader", ...)`
//! - The gate is a per-layer filter on the fmt layer only, so the span
//!   recorder still sees every span
//! - Interest is always `sometimes`: callsite caching would otherwise pin
//!   the first decision and ignore later level changes

use tracing::subscriber::Interest;
use tracing::Metadata;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Filter, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, Layer, Registry};

use crate::config::schema::{LogFormat, LoggingConfig};
use crate::observability::level::Severity;
use crate::observability::registry::LoggerRegistry;
use crate::observability::tracing::SpanRecorder;

/// Admits an event when the logger governing its target allows its level.
#[derive(Debug, Clone)]
pub struct RegistryFilter {
    registry: LoggerRegistry,
}

impl RegistryFilter {
    pub fn new(registry: LoggerRegistry) -> Self {
        Self { registry }
    }

    fn admits(&self, meta: &Metadata<'_>) -> bool {
        // Spans are context for events, not output of their own.
        if meta.is_span() {
            return true;
        }
        self.registry
            .enabled(meta.target(), Severity::from(*meta.level()))
    }
}

impl<S> Filter<S> for RegistryFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        self.admits(meta)
    }

    fn callsite_enabled(&self, _meta: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(LevelFilter::TRACE)
    }
}

/// Build the fmt layer for the configured format.
pub fn fmt_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_ansi(config.ansi).with_target(true);
    match config.format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global subscriber.
///
/// The fmt layer is gated by `registry`; `recorder`, when present, captures
/// spans for export.
pub fn init_logging(
    config: &LoggingConfig,
    registry: &LoggerRegistry,
    recorder: Option<SpanRecorder>,
) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(fmt_layer(config).with_filter(RegistryFilter::new(registry.clone())))
        .with(recorder)
        .try_init()
}
