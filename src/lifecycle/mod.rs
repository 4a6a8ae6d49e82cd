//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Registry → Subscriber → Env override → Watchers → Exporter → Pipeline
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Watchers exit → Producers stop → Consumers drain → Exporter flushes
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: levels are settled before the pipeline logs anything
//! - Ordered shutdown: nothing is lost between producers and consumers
//! - Draining has a timeout: stragglers are aborted and reported

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
