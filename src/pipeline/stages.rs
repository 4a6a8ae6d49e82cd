//! Processing stages.
//!
//! Every item goes through [`Stage::ALL`] in order. What a stage does is
//! supplied by a [`Stages`] implementation; [`SimulatedStages`] spends time
//! and logs, standing in for real decode/calculate/commit work.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::pipeline::item::DataItem;
use crate::pipeline::PROCESSOR_TARGET;

/// One step of item processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Calculate,
    Commit,
}

impl Stage {
    /// Execution order.
    pub const ALL: [Stage; 3] = [Stage::Decode, Stage::Calculate, Stage::Commit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Calculate => "calculate",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failed for one item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} failed: {reason}")]
pub struct StageError {
    pub stage: Stage,
    pub reason: String,
}

impl StageError {
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Work performed at each stage.
pub trait Stages: Send + Sync + 'static {
    fn run(&self, stage: Stage, item: &DataItem) -> impl Future<Output = Result<(), StageError>> + Send;
}

/// Time-costing placeholder stages.
#[derive(Debug, Clone)]
pub struct SimulatedStages {
    decode: Duration,
    calculate_min: Duration,
    calculate_max: Duration,
    commit: Duration,
}

impl SimulatedStages {
    pub fn new(decode: Duration, calculate: (Duration, Duration), commit: Duration) -> Self {
        Self {
            decode,
            calculate_min: calculate.0,
            calculate_max: calculate.1.max(calculate.0),
            commit,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Duration::from_millis(config.decode_ms),
            (
                Duration::from_millis(config.calculate_min_ms),
                Duration::from_millis(config.calculate_max_ms),
            ),
            Duration::from_millis(config.commit_ms),
        )
    }

    /// Stages that take no time.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, (Duration::ZERO, Duration::ZERO), Duration::ZERO)
    }

    fn cost(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Decode => self.decode,
            Stage::Calculate if self.calculate_max > self.calculate_min => {
                rand::thread_rng().gen_range(self.calculate_min..=self.calculate_max)
            }
            Stage::Calculate => self.calculate_min,
            Stage::Commit => self.commit,
        }
    }
}

impl Default for SimulatedStages {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Stages for SimulatedStages {
    async fn run(&self, stage: Stage, item: &DataItem) -> Result<(), StageError> {
        match stage {
            Stage::Decode => {
                tracing::debug!(target: PROCESSOR_TARGET, source = item.source, "decoding datum {}", item.payload)
            }
            Stage::Calculate => {
                tracing::debug!(target: PROCESSOR_TARGET, source = item.source, "calculating datum {}", item.payload)
            }
            Stage::Commit => {
                tracing::debug!(target: PROCESSOR_TARGET, source = item.source, "committing results for {} to memory", item.payload)
            }
        }

        let cost = self.cost(stage);
        if !cost.is_zero() {
            tokio::time::sleep(cost).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost_in_range() {
        let stages = SimulatedStages::default();
        for _ in 0..100 {
            let cost = stages.cost(Stage::Calculate);
            assert!(cost >= Duration::from_millis(10) && cost <= Duration::from_millis(35));
        }
        assert_eq!(stages.cost(Stage::Decode), Duration::from_millis(10));
        assert_eq!(stages.cost(Stage::Commit), Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_simulated_stage_spends_time() {
        let stages = SimulatedStages::new(
            Duration::from_millis(20),
            (Duration::ZERO, Duration::ZERO),
            Duration::ZERO,
        );
        let item = DataItem::new(0, "abc");

        let start = std::time::Instant::now();
        stages.run(Stage::Decode, &item).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
