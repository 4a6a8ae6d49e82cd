//! Pipeline behavior: liveness, stage ordering, spans, and shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use levelwatch::config::PipelineConfig;
use levelwatch::observability::tracing::{SpanBuffer, SpanRecord, SpanRecorder};
use levelwatch::pipeline::consumer::process_item;
use levelwatch::pipeline::{
    DataItem, FixedDelay, Pipeline, PipelineError, SimulatedStages, Stage, StageError, Stages,
};
use levelwatch::Shutdown;
use tracing_subscriber::layer::SubscriberExt;
use uuid::Uuid;

fn config(producers: usize, consumers: usize) -> PipelineConfig {
    PipelineConfig {
        producers,
        consumers,
        payload_len: 8,
        drain_timeout_ms: 2_000,
        ..PipelineConfig::default()
    }
}

/// Records every stage call; optionally fails one stage.
#[derive(Default)]
struct RecordingStages {
    calls: Mutex<Vec<(Uuid, Stage)>>,
    fail_at: Option<Stage>,
    delay: Duration,
}

impl RecordingStages {
    fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(Uuid, Stage)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Stages for RecordingStages {
    async fn run(&self, stage: Stage, item: &DataItem) -> Result<(), StageError> {
        self.calls.lock().unwrap().push((item.id, stage));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_at == Some(stage) {
            return Err(StageError::new(stage, "injected"));
        }
        Ok(())
    }
}

/// Stages that hold every item far longer than any drain timeout.
struct StuckStages;

impl Stages for StuckStages {
    async fn run(&self, _stage: Stage, _item: &DataItem) -> Result<(), StageError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_liveness_and_no_loss_at_shutdown() {
    let shutdown = Shutdown::new();
    let pipeline = Pipeline::new(
        config(4, 3),
        SimulatedStages::instant(),
        FixedDelay(Duration::from_millis(5)),
    );

    let handle = pipeline.start(&shutdown);
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.trigger();

    let stats = handle.join().await.unwrap();
    assert!(stats.sent >= 4, "only {} items sent", stats.sent);
    assert_eq!(stats.sent, stats.received);
    assert_eq!(stats.received, stats.processed + stats.failed);
    assert_eq!(stats.failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_buffered_queue_drains_on_shutdown() {
    let shutdown = Shutdown::new();
    let mut config = config(3, 1);
    config.queue_capacity = 16;
    let stages = RecordingStages {
        delay: Duration::from_millis(2),
        ..RecordingStages::default()
    };

    let handle = Pipeline::new(config, stages, FixedDelay::ZERO).start(&shutdown);
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();

    let stats = handle.join().await.unwrap();
    assert!(stats.sent > 0);
    assert_eq!(stats.sent, stats.received);
    assert_eq!(stats.processed, stats.received);
}

#[tokio::test]
async fn test_stage_order_per_item() {
    let stages = RecordingStages::default();
    let items: Vec<DataItem> = (0..5).map(|source| DataItem::new(source, "abc")).collect();

    for item in &items {
        process_item(item, &stages).await.unwrap();
    }

    let calls = stages.calls();
    assert_eq!(calls.len(), items.len() * 3);
    for (item, chunk) in items.iter().zip(calls.chunks(3)) {
        let order: Vec<Stage> = chunk.iter().map(|(_, stage)| *stage).collect();
        assert_eq!(order, Stage::ALL.to_vec());
        assert!(chunk.iter().all(|(id, _)| *id == item.id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stage_order_with_concurrent_consumers() {
    let shutdown = Shutdown::new();
    let stages = Arc::new(RecordingStages {
        delay: Duration::from_millis(3),
        ..RecordingStages::default()
    });

    let delay = Arc::new(FixedDelay(Duration::from_millis(2)));
    let handle = Pipeline::from_shared(config(4, 3), stages.clone(), delay).start(&shutdown);
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.trigger();
    let stats = handle.join().await.unwrap();

    let calls = stages.calls();
    let mut per_item: HashMap<Uuid, Vec<Stage>> = HashMap::new();
    for (id, stage) in &calls {
        per_item.entry(*id).or_default().push(*stage);
    }

    assert!(stats.processed >= 4, "only {} items processed", stats.processed);
    assert_eq!(per_item.len() as u64, stats.processed);
    for order in per_item.values() {
        assert_eq!(order, &Stage::ALL.to_vec());
    }
}

#[tokio::test]
async fn test_failing_stage_stops_item() {
    let stages = RecordingStages::failing_at(Stage::Calculate);
    let item = DataItem::new(1, "abc");

    let err = process_item(&item, &stages).await.unwrap_err();
    assert_eq!(err.stage, Stage::Calculate);
    let order: Vec<Stage> = stages.calls().into_iter().map(|(_, stage)| stage).collect();
    assert_eq!(order, vec![Stage::Decode, Stage::Calculate]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_consumer_survives_failures() {
    let shutdown = Shutdown::new();
    let stages = RecordingStages::failing_at(Stage::Commit);

    let handle = Pipeline::new(config(2, 1), stages, FixedDelay(Duration::from_millis(5)))
        .start(&shutdown);
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.trigger();

    let stats = handle.join().await.unwrap();
    assert!(stats.failed >= 2, "only {} items failed", stats.failed);
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.received, stats.failed);
}

#[tokio::test]
async fn test_span_tree_per_item() {
    let buffer = SpanBuffer::new();
    let subscriber = tracing_subscriber::registry().with(SpanRecorder::new(buffer.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let stages = SimulatedStages::new(
        Duration::from_millis(2),
        (Duration::from_millis(1), Duration::from_millis(3)),
        Duration::from_millis(2),
    );
    let item = DataItem::new(7, "abc");
    process_item(&item, &stages).await.unwrap();

    let spans = buffer.drain();
    let root = spans.iter().find(|span| span.name == "processing").unwrap();
    let children: Vec<&SpanRecord> = spans.iter().filter(|span| span.id != root.id).collect();

    let names: Vec<&str> = children.iter().map(|span| span.name).collect();
    assert_eq!(names, vec!["decoding", "calculating", "committing"]);
    assert!(children.iter().all(|span| span.parent_id == Some(root.id)));
    assert!(children.iter().all(|span| span.source == Some(7)));
    assert_eq!(root.source, Some(7));
    assert!(!root.failed);

    let child_total: Duration = children.iter().map(|span| span.duration()).sum();
    assert!(root.duration() >= child_total);
}

#[tokio::test]
async fn test_failed_stage_marks_spans() {
    let buffer = SpanBuffer::new();
    let subscriber = tracing_subscriber::registry().with(SpanRecorder::new(buffer.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let stages = RecordingStages::failing_at(Stage::Decode);
    let item = DataItem::new(2, "abc");
    assert!(process_item(&item, &stages).await.is_err());

    let spans = buffer.drain();
    assert_eq!(spans.len(), 2);
    let decoding = spans.iter().find(|span| span.name == "decoding").unwrap();
    let root = spans.iter().find(|span| span.name == "processing").unwrap();
    assert!(decoding.failed);
    assert!(root.failed);
    assert_eq!(decoding.parent_id, Some(root.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drain_timeout_aborts_stuck_consumers() {
    let shutdown = Shutdown::new();
    let mut config = config(1, 1);
    config.drain_timeout_ms = 100;

    let handle = Pipeline::new(config, StuckStages, FixedDelay::ZERO).start(&shutdown);
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.trigger();

    match handle.join().await {
        Err(PipelineError::DrainTimeout { timeout, aborted }) => {
            assert_eq!(timeout, Duration::from_millis(100));
            assert!(aborted >= 1);
        }
        other => panic!("expected drain timeout, got {other:?}"),
    }
}
