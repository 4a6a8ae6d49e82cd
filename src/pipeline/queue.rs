//! Handoff queue between producers and consumers.
//!
//! # Responsibilities
//! - Multi-producer, multi-consumer delivery of [`DataItem`]s
//! - Rendezvous (capacity 0) or bounded buffering
//! - Count sends and receives
//!
//! # Design Decisions
//! - Receivers share one `mpsc::Receiver` behind a FIFO async mutex, so
//!   each item goes to exactly one consumer and waiting consumers are
//!   served in order
//! - A rendezvous send parks the item with an acknowledgement channel and
//!   returns only once a consumer has taken it
//! - The queue closes when every sender is dropped; receivers then drain
//!   what is left and get `None`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::pipeline::item::DataItem;

/// The queue was closed before the item was delivered.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("work queue closed")]
pub struct QueueClosed;

struct Envelope {
    item: DataItem,
    taken: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct QueueCounters {
    sent: AtomicU64,
    received: AtomicU64,
}

/// Producer side. Clone one per producer.
#[derive(Clone)]
pub struct WorkSender {
    tx: mpsc::Sender<Envelope>,
    rendezvous: bool,
    counters: Arc<QueueCounters>,
}

/// Consumer side. Clone one per consumer.
#[derive(Clone)]
pub struct WorkReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    counters: Arc<QueueCounters>,
}

/// Create a queue. `capacity == 0` makes every send a rendezvous.
pub fn channel(capacity: usize) -> (WorkSender, WorkReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(QueueCounters::default());

    (
        WorkSender {
            tx,
            rendezvous: capacity == 0,
            counters: counters.clone(),
        },
        WorkReceiver {
            rx: Arc::new(Mutex::new(rx)),
            counters,
        },
    )
}

impl WorkSender {
    /// Hand `item` to the queue.
    ///
    /// Waits while the queue is full; in rendezvous mode also waits until a
    /// consumer has taken the item.
    pub async fn send(&self, item: DataItem) -> Result<(), QueueClosed> {
        if self.rendezvous {
            let (taken_tx, taken_rx) = oneshot::channel();
            self.tx
                .send(Envelope { item, taken: Some(taken_tx) })
                .await
                .map_err(|_| QueueClosed)?;
            taken_rx.await.map_err(|_| QueueClosed)?;
        } else {
            self.tx
                .send(Envelope { item, taken: None })
                .await
                .map_err(|_| QueueClosed)?;
        }
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Items fully handed off so far.
    pub fn sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }
}

impl WorkReceiver {
    /// Take the next item, or `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<DataItem> {
        let envelope = {
            let mut rx = self.rx.lock().await;
            rx.recv().await?
        };

        if let Some(taken) = envelope.taken {
            let _ = taken.send(());
        }
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        Some(envelope.item)
    }

    /// Items taken so far.
    pub fn received(&self) -> u64 {
        self.counters.received.load(Ordering::Relaxed)
    }

    /// Items fully handed off so far.
    pub fn sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }
}
