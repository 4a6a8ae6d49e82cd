//! Mounted log-level watcher.
//!
//! # Responsibilities
//! - Apply the mounted level to one logger at startup
//! - Re-apply it whenever a source is modified or atomically replaced
//! - Re-register interest after a source is removed
//!
//! # Data Flow
//! ```text
//! notify thread ──(unbounded channel)──▶ event loop
//!     modify / create / close-write  → settle timer → re-apply
//!     remove / rename                → re-register  → settle timer → re-apply
//!     notify error                   → warn, continue
//!     shutdown / stream closed       → exit Ok
//! ```
//!
//! # Design Decisions
//! - Replacement deletes the inode the watch was attached to, so the watch
//!   dies with it; re-registering on removal is what keeps the watcher live
//! - Read, parse and registration failures end the watcher with an error the
//!   caller must surface; nothing is retried
//! - Events are coalesced over a short settle window so a truncate-then-write
//!   is read once, after the write

use std::time::Duration;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::source::{read_effective_level, LevelSources, WatchError};
use crate::observability::level::Severity;
use crate::observability::metrics;
use crate::observability::registry::Logger;

const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// How an event affects the watched sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Modified,
    Removed,
    Ignored,
}

fn classify(kind: &EventKind) -> Change {
    match kind {
        EventKind::Remove(_) => Change::Removed,
        EventKind::Modify(ModifyKind::Name(_)) => Change::Removed,
        EventKind::Modify(ModifyKind::Metadata(_)) => Change::Ignored,
        EventKind::Modify(_) | EventKind::Create(_) => Change::Modified,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Change::Modified,
        _ => Change::Ignored,
    }
}

/// Keeps one logger in sync with its mounted level sources.
#[derive(Debug)]
pub struct LevelWatcher {
    sources: LevelSources,
    logger: Logger,
    gated: bool,
    settle: Duration,
}

impl LevelWatcher {
    /// Create a watcher for `logger`. The allow-list, when configured,
    /// gates this logger unless disabled with [`with_allowlist`](Self::with_allowlist).
    pub fn new(sources: LevelSources, logger: Logger) -> Self {
        Self {
            sources,
            logger,
            gated: true,
            settle: DEFAULT_SETTLE,
        }
    }

    /// Whether the debug allow-list applies to this logger.
    pub fn with_allowlist(mut self, gated: bool) -> Self {
        self.gated = gated;
        self
    }

    /// Quiet period between the last change event and the re-read.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Read the sources and apply the derived level.
    ///
    /// Returns the previous and the applied level. On error the logger is
    /// left untouched.
    pub fn apply(&self) -> Result<(Severity, Severity), WatchError> {
        let level = read_effective_level(&self.sources, self.logger.name(), self.gated)?;
        let previous = self.logger.set_level(level);
        metrics::record_log_level(self.logger.name(), level);
        Ok((previous, level))
    }

    fn register(&self, watcher: &mut RecommendedWatcher) -> Result<(), WatchError> {
        for path in self.sources.paths() {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Registration {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Apply the current level, register interest, and spawn the event loop.
    ///
    /// Startup failures are returned directly. Failures after startup end
    /// the spawned task with an error.
    pub fn start(
        self,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<Result<(), WatchError>>, WatchError> {
        let (_, level) = self.apply()?;
        tracing::info!(
            module = %self.logger.name(),
            %level,
            path = ?self.sources.level_path,
            "Applied mounted log level"
        );

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(WatchError::Init)?;
        self.register(&mut watcher)?;

        tracing::debug!(module = %self.logger.name(), "Log level watcher started");
        Ok(tokio::spawn(self.run(watcher, events, shutdown)))
    }

    async fn run(
        self,
        mut watcher: RecommendedWatcher,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), WatchError> {
        let mut pending: Option<Instant> = None;

        loop {
            let deadline = pending;
            let settled = async move {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!(module = %self.logger.name(), "Log level watcher received shutdown signal");
                    return Ok(());
                }
                received = events.recv() => match received {
                    None => {
                        tracing::debug!(module = %self.logger.name(), "Watch event stream closed");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        tracing::warn!(module = %self.logger.name(), error = %e, "Watch error");
                    }
                    Some(Ok(event)) => match classify(&event.kind) {
                        Change::Removed => {
                            self.register(&mut watcher)?;
                            pending = Some(Instant::now() + self.settle);
                        }
                        Change::Modified => {
                            pending = Some(Instant::now() + self.settle);
                        }
                        Change::Ignored => {}
                    },
                },
                _ = settled => {
                    pending = None;
                    let (previous, level) = self.apply()?;
                    tracing::warn!(
                        module = %self.logger.name(),
                        %previous,
                        %level,
                        "updated log level watchers"
                    );
                }
            }
        }
    }
}
