//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (counts > 0, windows ordered, intervals > 0)
//! - Check that mounted sources are configured consistently
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{AllowListScope, AppConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check an [`AppConfig`] for semantic errors.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let logging = &config.logging;
    if logging.level_path.is_none() && logging.debug_modules_path.is_some() {
        errors.push(ValidationError::new(
            "logging.debug_modules_path",
            "requires logging.level_path",
        ));
    }
    if logging.watched.iter().any(|name| name.trim().is_empty()) {
        errors.push(ValidationError::new(
            "logging.watched",
            "logger names must not be empty",
        ));
    }
    if let AllowListScope::Modules(modules) = &logging.allowlist_scope {
        for module in modules {
            if !logging.watched.contains(module) {
                errors.push(ValidationError::new(
                    "logging.allowlist_scope",
                    format!("{:?} is not a watched logger", module),
                ));
            }
        }
    }
    if logging.env_override.is_empty() {
        errors.push(ValidationError::new(
            "logging.env_override",
            "variable name must not be empty",
        ));
    }

    let pipeline = &config.pipeline;
    if pipeline.producers == 0 {
        errors.push(ValidationError::new("pipeline.producers", "must be at least 1"));
    }
    if pipeline.consumers == 0 {
        errors.push(ValidationError::new("pipeline.consumers", "must be at least 1"));
    }
    if pipeline.calculate_min_ms > pipeline.calculate_max_ms {
        errors.push(ValidationError::new(
            "pipeline.calculate_min_ms",
            "must not exceed pipeline.calculate_max_ms",
        ));
    }
    if pipeline.payload_len == 0 {
        errors.push(ValidationError::new("pipeline.payload_len", "must be at least 1"));
    }
    if pipeline.drain_timeout_ms == 0 {
        errors.push(ValidationError::new("pipeline.drain_timeout_ms", "must be positive"));
    }

    if config.tracing.enabled {
        if config.tracing.flush_interval_ms == 0 {
            errors.push(ValidationError::new("tracing.flush_interval_ms", "must be positive"));
        }
        if config.tracing.max_batch == 0 {
            errors.push(ValidationError::new("tracing.max_batch", "must be at least 1"));
        }
    }

    if config.metrics.enabled && config.metrics.address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("{:?} is not a socket address", config.metrics.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
