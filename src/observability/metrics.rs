//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeline_items_sent_total` (counter): items handed to the queue, by source
//! - `pipeline_items_processed_total` (counter): items through all stages, by outcome
//! - `pipeline_stage_duration_seconds` (histogram): per-stage latency
//! - `log_level` (gauge): current severity ordinal, by module
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - The Prometheus endpoint is optional and off by default

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::level::Severity;

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_item_sent(source: usize) {
    metrics::counter!("pipeline_items_sent_total", "source" => source.to_string()).increment(1);
}

pub fn record_item_processed(failed: bool) {
    let outcome = if failed { "failed" } else { "ok" };
    metrics::counter!("pipeline_items_processed_total", "outcome" => outcome).increment(1);
}

pub fn record_stage(stage: &'static str, elapsed: Duration) {
    metrics::histogram!("pipeline_stage_duration_seconds", "stage" => stage).record(elapsed.as_secs_f64());
}

pub fn record_log_level(module: &str, level: Severity) {
    metrics::gauge!("log_level", "module" => module.to_string()).set(f64::from(level as u8));
}
