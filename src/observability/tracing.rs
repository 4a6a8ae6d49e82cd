//! Span capture and batched export.
//!
//! # Responsibilities
//! - Time every span and remember its parent
//! - Mark spans whose `outcome` is recorded as `failed`
//! - Ship closed spans to an exporter in batches on a flush interval
//!
//! # Design Decisions
//! - Span ids are assigned here rather than reusing `tracing` ids, which the
//!   registry recycles after close
//! - A child always closes before its parent, so the parent's extension is
//!   still present when the child is stamped
//! - The exporter never sees the wire format; it only receives finished,
//!   correctly parented records

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Value of the `outcome` field that marks a span as failed.
pub const FAILED: &str = "failed";

/// A finished span.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: &'static str,
    pub target: &'static str,
    pub start: Instant,
    pub end: Instant,
    /// The `source` field, when the span carried one.
    pub source: Option<u64>,
    pub failed: bool,
}

impl SpanRecord {
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Closed spans waiting for export.
#[derive(Debug, Clone, Default)]
pub struct SpanBuffer {
    inner: Arc<Mutex<Vec<SpanRecord>>>,
}

impl SpanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: SpanRecord) {
        if let Ok(mut spans) = self.inner.lock() {
            spans.push(record);
        }
    }

    /// Take everything buffered so far.
    pub fn drain(&self) -> Vec<SpanRecord> {
        match self.inner.lock() {
            Ok(mut spans) => std::mem::take(&mut *spans),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|spans| spans.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-span state kept in the registry's extensions.
struct SpanTiming {
    id: u64,
    parent_id: Option<u64>,
    start: Instant,
    source: Option<u64>,
    failed: bool,
}

#[derive(Default)]
struct SpanFields {
    source: Option<u64>,
    failed: bool,
}

impl Visit for SpanFields {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "source" {
            self.source = Some(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "source" {
            self.source = u64::try_from(value).ok();
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "outcome" && value == FAILED {
            self.failed = true;
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "outcome" && format!("{:?}", value).trim_matches('"') == FAILED {
            self.failed = true;
        }
    }
}

/// Layer that turns spans into [`SpanRecord`]s.
#[derive(Debug)]
pub struct SpanRecorder {
    buffer: SpanBuffer,
    next_id: AtomicU64,
}

impl SpanRecorder {
    pub fn new(buffer: SpanBuffer) -> Self {
        Self {
            buffer,
            next_id: AtomicU64::new(1),
        }
    }
}

impl<S> Layer<S> for SpanRecorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let parent_id = span
            .parent()
            .and_then(|parent| parent.extensions().get::<SpanTiming>().map(|t| t.id));

        let mut fields = SpanFields::default();
        attrs.record(&mut fields);

        span.extensions_mut().insert(SpanTiming {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            parent_id,
            start: Instant::now(),
            source: fields.source,
            failed: fields.failed,
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut fields = SpanFields::default();
        values.record(&mut fields);

        let mut extensions = span.extensions_mut();
        if let Some(timing) = extensions.get_mut::<SpanTiming>() {
            timing.failed |= fields.failed;
            if fields.source.is_some() {
                timing.source = fields.source;
            }
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };

        let timing = span.extensions_mut().remove::<SpanTiming>();
        if let Some(timing) = timing {
            let meta = span.metadata();
            self.buffer.push(SpanRecord {
                id: timing.id,
                parent_id: timing.parent_id,
                name: meta.name(),
                target: meta.target(),
                start: timing.start,
                end: Instant::now(),
                source: timing.source,
                failed: timing.failed,
            });
        }
    }
}

/// Destination for batches of finished spans.
pub trait SpanExporter: Send + Sync + 'static {
    fn export(&self, batch: Vec<SpanRecord>);
}

/// Writes one debug line per span.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    fn export(&self, batch: Vec<SpanRecord>) {
        for span in batch {
            tracing::debug!(
                target: "levelwatch::export",
                span = span.name,
                id = span.id,
                parent = ?span.parent_id,
                source = ?span.source,
                failed = span.failed,
                elapsed_ms = span.duration().as_secs_f64() * 1000.0,
                "span finished"
            );
        }
    }
}

/// Keeps every exported span; useful for inspection and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
    batches: Arc<AtomicU64>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans exported so far.
    pub fn finished(&self) -> Vec<SpanRecord> {
        self.spans.lock().map(|spans| spans.clone()).unwrap_or_default()
    }

    /// Number of non-empty batches received.
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, batch: Vec<SpanRecord>) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut spans) = self.spans.lock() {
            spans.extend(batch);
        }
    }
}

fn flush<E: SpanExporter>(buffer: &SpanBuffer, exporter: &E, max_batch: usize) -> usize {
    let mut pending = buffer.drain();
    let total = pending.len();
    while !pending.is_empty() {
        let rest = pending.split_off(pending.len().min(max_batch.max(1)));
        exporter.export(pending);
        pending = rest;
    }
    total
}

/// Drain `buffer` into `exporter` every `interval`, plus once on shutdown.
pub fn spawn_batch_exporter<E: SpanExporter>(
    buffer: SpanBuffer,
    exporter: E,
    interval: Duration,
    max_batch: usize,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush(&buffer, &exporter, max_batch);
                }
                _ = shutdown.recv() => {
                    let exported = flush(&buffer, &exporter, max_batch);
                    tracing::debug!(exported, "Span exporter flushed on shutdown");
                    break;
                }
            }
        }
    })
}
