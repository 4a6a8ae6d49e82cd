//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from TOML files, and
//! every section has defaults so an empty file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::level::Severity;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Log levels, mounted sources and output format.
    pub logging: LoggingConfig,

    /// Producer/consumer pipeline settings.
    pub pipeline: PipelineConfig,

    /// Span export settings.
    pub tracing: TracingConfig,

    /// Prometheus endpoint settings.
    pub metrics: MetricsConfig,
}

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

/// Which loggers the debug-module allow-list gates.
///
/// In TOML: `allowlist_scope = "all_modules"` or
/// `allowlist_scope = { modules = ["loader"] }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllowListScope {
    /// Every watched logger must appear in the list to go below info.
    #[default]
    AllModules,
    /// Only these loggers are gated; the rest take the level as written.
    Modules(Vec<String>),
}

impl AllowListScope {
    pub fn applies_to(&self, module: &str) -> bool {
        match self {
            AllowListScope::AllModules => true,
            AllowListScope::Modules(modules) => modules.iter().any(|m| m == module),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level every logger starts at before any override.
    pub default_level: Severity,

    /// Environment variable holding a one-shot startup override.
    pub env_override: String,

    /// Mounted file holding the level. `None` disables watching.
    pub level_path: Option<PathBuf>,

    /// Mounted file holding the comma-separated debug allow-list.
    pub debug_modules_path: Option<PathBuf>,

    /// Loggers to register and keep in sync with the mounted level.
    pub watched: Vec<String>,

    /// Loggers the allow-list applies to.
    pub allowlist_scope: AllowListScope,

    /// Quiet period after a change event before the file is re-read.
    pub settle_ms: u64,

    /// Output format.
    pub format: LogFormat,

    /// Force ANSI colors.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: Severity::Info,
            env_override: "LOG_LEVEL".to_string(),
            level_path: Some(PathBuf::from("/conf/log_level")),
            debug_modules_path: Some(PathBuf::from("/conf/log_debug_modules")),
            watched: vec!["main".to_string(), "loader".to_string(), "processor".to_string()],
            allowlist_scope: AllowListScope::AllModules,
            settle_ms: 100,
            format: LogFormat::Full,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of producer tasks.
    pub producers: usize,

    /// Number of consumer tasks.
    pub consumers: usize,

    /// Queue capacity; 0 is a rendezvous handoff.
    pub queue_capacity: usize,

    /// Lower bound of the producer delay window in milliseconds.
    pub delay_min_ms: u64,

    /// Width of the producer delay window in milliseconds.
    pub delay_span_ms: u64,

    /// Length of each synthesized payload.
    pub payload_len: usize,

    /// Simulated decode time in milliseconds.
    pub decode_ms: u64,

    /// Simulated calculate time range in milliseconds (inclusive).
    pub calculate_min_ms: u64,
    pub calculate_max_ms: u64,

    /// Simulated commit time in milliseconds.
    pub commit_ms: u64,

    /// How long consumers may take to drain after shutdown.
    pub drain_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            producers: 5,
            consumers: 5,
            queue_capacity: 0,
            delay_min_ms: 200,
            delay_span_ms: 500,
            payload_len: 12,
            decode_ms: 10,
            calculate_min_ms: 10,
            calculate_max_ms: 35,
            commit_ms: 15,
            drain_timeout_ms: 5_000,
        }
    }
}

impl PipelineConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Span export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Record and export spans.
    pub enabled: bool,

    /// Export flush interval in milliseconds.
    pub flush_interval_ms: u64,

    /// Maximum spans per exported batch.
    pub max_batch: usize,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // Conventional default is 5s; 1s makes traces show up promptly.
            flush_interval_ms: 1_000,
            max_batch: 512,
        }
    }
}

impl TracingConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve a Prometheus scrape endpoint.
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}
