//! Producer/consumer processing pipeline.
//!
//! # Data Flow
//! ```text
//! producer 0 ─┐                      ┌─ consumer 0 ─ decode → calculate → commit
//! producer 1 ─┼─▶ queue (rendezvous) ┼─ consumer 1 ─ decode → calculate → commit
//! producer N ─┘                      └─ consumer M ─ decode → calculate → commit
//! ```
//!
//! # Shutdown
//! ```text
//! Shutdown::trigger
//!     → producers stop between items and drop their senders
//!     → queue closes once the last sender is gone
//!     → consumers drain what is left and exit
//!     → PipelineHandle::join returns, or aborts stragglers after drain_timeout
//! ```
//!
//! # Design Decisions
//! - No ordering across items or sources; strict stage order within an item
//! - A failing item is dropped and logged; the consumer keeps going
//! - Pacing is an injected `DelayPolicy` so tests run without real jitter

pub mod consumer;
pub mod delay;
pub mod item;
pub mod producer;
pub mod queue;
pub mod stages;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time;

use crate::config::PipelineConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

pub use delay::{DelayPolicy, FixedDelay, JitterDelay};
pub use item::DataItem;
pub use stages::{SimulatedStages, Stage, StageError, Stages};

/// Logger target of the producers.
pub const LOADER_TARGET: &str = "loader";

/// Logger target of the consumers and stages.
pub const PROCESSOR_TARGET: &str = "processor";

/// Errors from stopping the pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline did not drain within {timeout:?}; aborted {aborted} task(s)")]
    DrainTimeout { timeout: Duration, aborted: usize },

    #[error("{0} pipeline task(s) panicked")]
    TaskPanicked(usize),
}

/// Processing outcome counters shared by the consumers.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl PipelineCounters {
    pub fn record_processed(&self, failed: bool) {
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_item_processed(failed);
    }
}

/// Point-in-time pipeline counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Items fully handed to a consumer.
    pub sent: u64,
    /// Items taken from the queue.
    pub received: u64,
    /// Items that went through every stage.
    pub processed: u64,
    /// Items dropped after a stage failure.
    pub failed: u64,
}

/// A configured, not yet running pipeline.
pub struct Pipeline<S: Stages, D: DelayPolicy> {
    config: PipelineConfig,
    stages: Arc<S>,
    delay: Arc<D>,
}

impl Pipeline<SimulatedStages, JitterDelay> {
    /// Simulated stages and jittered pacing, both taken from `config`.
    pub fn simulated(config: PipelineConfig) -> Self {
        let stages = SimulatedStages::from_config(&config);
        let delay = JitterDelay::new(
            Duration::from_millis(config.delay_min_ms),
            Duration::from_millis(config.delay_span_ms),
        );
        Self::new(config, stages, delay)
    }
}

impl<S: Stages, D: DelayPolicy> Pipeline<S, D> {
    pub fn new(config: PipelineConfig, stages: S, delay: D) -> Self {
        Self::from_shared(config, Arc::new(stages), Arc::new(delay))
    }

    /// Build from stages and pacing the caller keeps a handle to.
    pub fn from_shared(config: PipelineConfig, stages: Arc<S>, delay: Arc<D>) -> Self {
        Self { config, stages, delay }
    }

    /// Spawn every producer and consumer.
    pub fn start(self, shutdown: &Shutdown) -> PipelineHandle {
        let (sender, receiver) = queue::channel(self.config.queue_capacity);
        let counters = Arc::new(PipelineCounters::default());
        let mut producers = JoinSet::new();
        let mut consumers = JoinSet::new();

        for source in 0..self.config.producers {
            producers.spawn(producer::run(
                source,
                sender.clone(),
                self.delay.clone(),
                self.config.payload_len,
                shutdown.subscribe(),
            ));
        }
        // Only producers hold senders, so the queue closes when they stop.
        drop(sender);

        for id in 0..self.config.consumers {
            consumers.spawn(consumer::run(
                id,
                receiver.clone(),
                self.stages.clone(),
                counters.clone(),
            ));
        }

        tracing::info!(
            producers = self.config.producers,
            consumers = self.config.consumers,
            queue_capacity = self.config.queue_capacity,
            "Pipeline started"
        );

        PipelineHandle {
            producers,
            consumers,
            queue: receiver,
            counters,
            drain_timeout: self.config.drain_timeout(),
        }
    }
}

/// Running pipeline.
pub struct PipelineHandle {
    producers: JoinSet<()>,
    consumers: JoinSet<()>,
    queue: queue::WorkReceiver,
    counters: Arc<PipelineCounters>,
    drain_timeout: Duration,
}

impl PipelineHandle {
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            sent: self.queue.sent(),
            received: self.queue.received(),
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Wait for the pipeline to stop after shutdown has been triggered.
    ///
    /// Producers finish their current handoff and consumers drain the
    /// queue. Whatever is still running after the drain timeout is aborted
    /// and reported as an error.
    pub async fn join(mut self) -> Result<PipelineStats, PipelineError> {
        let mut panicked = 0;
        let drained = time::timeout(self.drain_timeout, async {
            for set in [&mut self.producers, &mut self.consumers] {
                while let Some(joined) = set.join_next().await {
                    if joined.is_err() {
                        panicked += 1;
                    }
                }
            }
        })
        .await;

        let stats = self.stats();
        if drained.is_err() {
            let aborted = self.producers.len() + self.consumers.len();
            self.producers.abort_all();
            self.consumers.abort_all();
            tracing::error!(
                aborted,
                timeout = ?self.drain_timeout,
                "Pipeline drain timed out, aborting remaining tasks"
            );
            return Err(PipelineError::DrainTimeout {
                timeout: self.drain_timeout,
                aborted,
            });
        }
        if panicked > 0 {
            return Err(PipelineError::TaskPanicked(panicked));
        }

        tracing::info!(
            sent = stats.sent,
            processed = stats.processed,
            failed = stats.failed,
            "Pipeline drained"
        );
        Ok(stats)
    }
}
