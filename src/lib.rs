//! Live-reloadable per-module log levels driving a traced worker pipeline.
//!
//! A mounted level file (and an optional debug allow-list) is watched and
//! applied to named loggers while a set of producers hands items to
//! consumers that decode, calculate, and commit them under nested spans.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use config::{AppConfig, LevelSources, LevelWatcher, WatchError};
pub use lifecycle::{Shutdown, StartupError};
pub use observability::{Logger, LoggerRegistry, Severity};
pub use pipeline::{Pipeline, PipelineHandle, PipelineStats};
