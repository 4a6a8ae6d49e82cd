//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with a module target
//!         → logging.rs (RegistryFilter asks registry.rs for the target's level)
//!         → fmt layer (stdout)
//!     → spans
//!         → tracing.rs (SpanRecorder → SpanBuffer → batch exporter)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Level changes:
//!     config::watcher → Logger::set_level → next event sees the new level
//! ```
//!
//! # Design Decisions
//! - One registry instance, injected; no global logger state
//! - Level reads are a single atomic load per event
//! - Span export is batched and independent of the log format

pub mod level;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod tracing;

pub use level::{level_from_env, ParseSeverityError, Severity};
pub use registry::{Logger, LoggerRegistry, ROOT_LOGGER};
