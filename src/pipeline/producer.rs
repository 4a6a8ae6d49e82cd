//! Producer tasks.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::pipeline::delay::DelayPolicy;
use crate::pipeline::item::{random_payload, DataItem};
use crate::pipeline::queue::WorkSender;
use crate::pipeline::LOADER_TARGET;

/// Produce items for `source` until shutdown or until the queue closes.
///
/// Shutdown is only observed while waiting between items. A handoff that
/// has started always completes, so nothing is lost when stopping.
pub async fn run<D: DelayPolicy>(
    source: usize,
    queue: WorkSender,
    delay: Arc<D>,
    payload_len: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::debug!(target: LOADER_TARGET, source, "Producer started");

    let mut attempt = 0u64;
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => break,
            _ = time::sleep(delay.next_delay(attempt)) => {}
        }
        attempt += 1;

        let item = DataItem::new(source, random_payload(payload_len));
        tracing::debug!(target: LOADER_TARGET, source, item = %item.id, "successfully loaded entry");

        if queue.send(item).await.is_err() {
            tracing::warn!(target: LOADER_TARGET, source, "Work queue closed, producer exiting");
            return;
        }
        metrics::record_item_sent(source);
    }

    tracing::debug!(target: LOADER_TARGET, source, "Producer received shutdown signal, exiting loop");
}
