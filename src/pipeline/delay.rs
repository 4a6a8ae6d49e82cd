//! Producer pacing.
//!
//! A [`DelayPolicy`] decides how long a producer waits before synthesizing
//! its next item. The default is a jittered window; tests substitute a
//! fixed or zero delay.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Chooses the wait before each produced item.
pub trait DelayPolicy: Send + Sync + 'static {
    /// Delay before item number `attempt` (starting at 0).
    fn next_delay(&self, attempt: u64) -> Duration;
}

/// Uniform delay in `[min, min + span)` milliseconds.
#[derive(Debug)]
pub struct JitterDelay {
    min_ms: u64,
    span_ms: u64,
    rng: Option<Mutex<StdRng>>,
}

impl JitterDelay {
    pub fn new(min: Duration, span: Duration) -> Self {
        Self {
            min_ms: min.as_millis() as u64,
            span_ms: span.as_millis() as u64,
            rng: None,
        }
    }

    /// Same window, drawn from a seeded generator for reproducible runs.
    pub fn seeded(min: Duration, span: Duration, seed: u64) -> Self {
        Self {
            rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
            ..Self::new(min, span)
        }
    }

    fn jitter(&self) -> u64 {
        if self.span_ms == 0 {
            return 0;
        }
        match &self.rng {
            Some(rng) => match rng.lock() {
                Ok(mut rng) => rng.gen_range(0..self.span_ms),
                Err(_) => 0,
            },
            None => rand::thread_rng().gen_range(0..self.span_ms),
        }
    }
}

impl Default for JitterDelay {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_millis(500))
    }
}

impl DelayPolicy for JitterDelay {
    fn next_delay(&self, _attempt: u64) -> Duration {
        Duration::from_millis(self.min_ms + self.jitter())
    }
}

/// The same delay every time; `FixedDelay::ZERO` never waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    pub const ZERO: FixedDelay = FixedDelay(Duration::ZERO);
}

impl DelayPolicy for FixedDelay {
    fn next_delay(&self, _attempt: u64) -> Duration {
        self.0
    }
}
