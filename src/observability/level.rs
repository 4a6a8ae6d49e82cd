//! Severity levels.
//!
//! # Responsibilities
//! - Define the ordered severity enumeration shared by loggers and watchers
//! - Parse severity tokens from mounted files and the environment
//! - Map `tracing` levels onto severities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordered log severity.
///
/// `Trace < Debug < Info < Warn < Error < Fatal < Panic`. A log call is
/// emitted when its severity is greater than or equal to the logger's level.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
    Panic = 6,
}

impl Severity {
    /// All severities, finest first.
    pub const ALL: [Severity; 7] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
        Severity::Panic,
    ];

    /// Lowercase token for this severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
            Severity::Panic => "panic",
        }
    }

    /// True for `Debug` and `Trace`.
    pub fn is_debug_or_finer(&self) -> bool {
        *self <= Severity::Debug
    }
}

/// Ordinals outside the enumeration saturate to `Panic`.
impl From<u8> for Severity {
    fn from(val: u8) -> Self {
        match val {
            0 => Severity::Trace,
            1 => Severity::Debug,
            2 => Severity::Info,
            3 => Severity::Warn,
            4 => Severity::Error,
            5 => Severity::Fatal,
            _ => Severity::Panic,
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Trace,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a token is not a severity name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid log level: {0:?}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            "panic" => Ok(Severity::Panic),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = ParseSeverityError;

    fn try_from(value: String) -> Result<Self, ParseSeverityError> {
        value.parse()
    }
}

impl From<Severity> for String {
    fn from(level: Severity) -> Self {
        level.as_str().to_string()
    }
}

/// Read a startup override from the environment.
///
/// Unset or empty variables yield `Ok(None)`.
pub fn level_from_env(var: &str) -> Result<Option<Severity>, ParseSeverityError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}
