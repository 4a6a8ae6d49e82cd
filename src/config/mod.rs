//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! app config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!
//! mounted level sources (/conf/log_level, /conf/log_debug_modules)
//!     → source.rs (read, parse, derive per-module level)
//!     → watcher.rs (apply at startup, re-apply on change or replacement)
//!     → Logger::set_level
//! ```
//!
//! # Design Decisions
//! - The app config is read once; only log levels change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A mounted source that cannot be read or parsed is fatal

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use schema::AppConfig;
pub use schema::{AllowListScope, LogFormat, LoggingConfig, MetricsConfig, PipelineConfig, TracingConfig};
pub use source::{LevelSources, ModuleAllowList, WatchError};
pub use watcher::LevelWatcher;
