//! Consumer tasks.
//!
//! # Span Tree
//! ```text
//! processing (source, item, outcome)
//!     ├── decoding
//!     ├── calculating
//!     └── committing
//! ```
//!
//! Spans are attached with `Instrument`, so each one closes when its future
//! is dropped, whether the stage returned normally or with an error.

use std::sync::Arc;
use std::time::Instant;

use tracing::field::Empty;
use tracing::{Instrument, Span};

use crate::observability::metrics;
use crate::observability::tracing::FAILED;
use crate::pipeline::item::DataItem;
use crate::pipeline::queue::WorkReceiver;
use crate::pipeline::stages::{Stage, StageError, Stages};
use crate::pipeline::{PipelineCounters, PROCESSOR_TARGET};

fn stage_span(stage: Stage, item: &DataItem) -> Span {
    match stage {
        Stage::Decode => tracing::info_span!(target: PROCESSOR_TARGET, "decoding", source = item.source, outcome = Empty),
        Stage::Calculate => tracing::info_span!(target: PROCESSOR_TARGET, "calculating", source = item.source, outcome = Empty),
        Stage::Commit => tracing::info_span!(target: PROCESSOR_TARGET, "committing", source = item.source, outcome = Empty),
    }
}

async fn run_stage<S: Stages>(stages: &S, stage: Stage, item: &DataItem) -> Result<(), StageError> {
    let span = stage_span(stage, item);
    let started = Instant::now();
    let result = stages.run(stage, item).instrument(span.clone()).await;
    metrics::record_stage(stage.as_str(), started.elapsed());

    if result.is_err() {
        span.record("outcome", FAILED);
    }
    result
}

/// Run one item through every stage under a root `processing` span.
///
/// Stops at the first failing stage; the root span is marked failed.
pub async fn process_item<S: Stages>(item: &DataItem, stages: &S) -> Result<(), StageError> {
    let root = tracing::info_span!(
        target: PROCESSOR_TARGET,
        "processing",
        source = item.source,
        item = %item.id,
        outcome = Empty,
    );

    let result = async {
        for stage in Stage::ALL {
            run_stage(stages, stage, item).await?;
        }
        Ok::<(), StageError>(())
    }
    .instrument(root.clone())
    .await;

    root.record("outcome", if result.is_ok() { "ok" } else { FAILED });
    result
}

/// Drain `queue` until it is closed and empty.
///
/// A failing item is logged and dropped; the loop keeps going.
pub async fn run<S: Stages>(
    consumer: usize,
    queue: WorkReceiver,
    stages: Arc<S>,
    counters: Arc<PipelineCounters>,
) {
    tracing::debug!(target: PROCESSOR_TARGET, consumer, "Consumer started");

    while let Some(item) = queue.recv().await {
        match process_item(&item, stages.as_ref()).await {
            Ok(()) => counters.record_processed(false),
            Err(e) => {
                counters.record_processed(true);
                tracing::error!(
                    target: PROCESSOR_TARGET,
                    consumer,
                    source = item.source,
                    item = %item.id,
                    error = %e,
                    "Dropping item"
                );
            }
        }
    }

    tracing::debug!(target: PROCESSOR_TARGET, consumer, "Consumer drained, exiting");
}
