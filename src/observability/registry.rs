//! Per-module loggers and the registry that owns them.
//!
//! # Responsibilities
//! - Hold the effective severity of every named logger
//! - Resolve a `tracing` target to the logger that governs it
//! - Apply process-wide overrides (environment) to every logger
//!
//! # Design Decisions
//! - Each level is a single `AtomicU8`; writers swap, readers load, so a
//!   reader never observes a partially written level
//! - The name map is read on every log call and written only when a logger
//!   is registered, so it is published through `ArcSwap` (RCU on write)
//! - Targets with no registered logger fall back to the root logger

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::observability::level::Severity;

/// Name of the root logger.
pub const ROOT_LOGGER: &str = "main";

#[derive(Debug)]
struct LoggerInner {
    name: String,
    level: AtomicU8,
}

/// A named logger whose minimum severity can change at runtime.
///
/// Clones share the same level.
#[derive(Debug, Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// Create a standalone logger.
    pub fn new(name: impl Into<String>, level: Severity) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                name: name.into(),
                level: AtomicU8::new(level as u8),
            }),
        }
    }

    /// Module name this logger governs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current minimum severity.
    pub fn level(&self) -> Severity {
        Severity::from(self.inner.level.load(Ordering::Acquire))
    }

    /// Replace the minimum severity, returning the previous one.
    pub fn set_level(&self, level: Severity) -> Severity {
        Severity::from(self.inner.level.swap(level as u8, Ordering::AcqRel))
    }

    /// Whether a call at `severity` would be emitted.
    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.level()
    }
}

/// Mapping from module name to [`Logger`].
///
/// Passed explicitly to whatever needs it (the subscriber filter, the
/// watchers, the bootstrap); there is no global instance.
#[derive(Debug, Clone)]
pub struct LoggerRegistry {
    root: Logger,
    loggers: Arc<ArcSwap<HashMap<String, Logger>>>,
}

impl LoggerRegistry {
    /// Create a registry whose root logger starts at `default`.
    pub fn new(default: Severity) -> Self {
        let root = Logger::new(ROOT_LOGGER, default);
        let mut loggers = HashMap::new();
        loggers.insert(ROOT_LOGGER.to_string(), root.clone());

        Self {
            root,
            loggers: Arc::new(ArcSwap::from_pointee(loggers)),
        }
    }

    /// The root logger.
    pub fn root(&self) -> &Logger {
        &self.root
    }

    /// Get the logger for `name`, registering it if needed.
    ///
    /// A newly registered logger starts at the root logger's current level.
    pub fn logger(&self, name: &str) -> Logger {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let created = Logger::new(name, self.root.level());
        let mut registered = created.clone();
        self.loggers.rcu(|current| {
            let mut next = HashMap::clone(current);
            registered = next
                .entry(name.to_string())
                .or_insert_with(|| created.clone())
                .clone();
            next
        });
        registered
    }

    /// Look up a registered logger.
    pub fn get(&self, name: &str) -> Option<Logger> {
        self.loggers.load().get(name).cloned()
    }

    /// The logger governing `target`: the exact registered name, else root.
    pub fn resolve(&self, target: &str) -> Logger {
        self.get(target).unwrap_or_else(|| self.root.clone())
    }

    /// Whether an event at `severity` for `target` would be emitted.
    pub fn enabled(&self, target: &str, severity: Severity) -> bool {
        match self.loggers.load().get(target) {
            Some(logger) => logger.enabled(severity),
            None => self.root.enabled(severity),
        }
    }

    /// Set every registered logger to `level`.
    pub fn set_all(&self, level: Severity) {
        for logger in self.loggers.load().values() {
            logger.set_level(level);
        }
    }

    /// Registered logger names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loggers.load().keys().cloned().collect();
        names.sort();
        names
    }
}
