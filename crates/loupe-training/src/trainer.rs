use crate::error::{TrainingError, TrainingResult};
use crate::progress::{ProgressEvent, StopToken};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hosts at or above this much RAM can afford training without gradient checkpointing.
const ROOMY_HOST_MEMORY_GB: u64 = 30;
/// ...as long as the model stays below this many parameters.
const SMALL_MODEL_PARAMETERS: u64 = 2_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Model-only adapter weights, loadable for evaluation.
    Adapter,
    /// Full trainer state, sufficient to resume training.
    TrainerCheckpoint,
}

/// Anything that can write its current trainable state to a path.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn write_snapshot(&self, kind: SnapshotKind, destination: &Path) -> anyhow::Result<()>;
}

/// The opaque training backend supervised by the controller.
///
/// Progress is pulled one event at a time; the controller finishes reacting to
/// an event before asking for the next one. The trainer must check the
/// [`StopToken`] it was started with and end its stream once it is requested.
#[async_trait]
pub trait Trainer: SnapshotSource {
    fn id(&self) -> &'static str;

    async fn start(&mut self, config: &TrainerConfig, stop: StopToken) -> anyhow::Result<()>;

    /// `Ok(None)` once the run is over.
    async fn next_progress(&mut self) -> anyhow::Result<Option<ProgressEvent>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub batch_size: u32,
    pub iteration_count: u64,
    /// Context window in tokens; longer training samples are dropped by the trainer.
    pub context_size: u32,
    /// Resume a previous session from this trainer checkpoint.
    pub resume_from: Option<PathBuf>,
    /// Trade speed for memory (gradient checkpointing).
    pub memory_optimized: bool,
    /// Cap on the number of training samples drawn from the dataset.
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            iteration_count: 1000,
            context_size: 128,
            resume_from: None,
            memory_optimized: true,
            max_samples: 1000,
            seed: 5001,
        }
    }
}

impl TrainerConfig {
    /// Turn memory-optimized mode off when the host has room to spare for the model.
    #[must_use]
    pub fn tune_for_host(mut self, host_memory_gb: u64, parameter_count: u64) -> Self {
        if host_memory_gb >= ROOMY_HOST_MEMORY_GB && parameter_count < SMALL_MODEL_PARAMETERS {
            self.memory_optimized = false;
        }
        self
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("trainer.batch_size must be >= 1".to_string()));
        }
        if self.iteration_count == 0 {
            return Err(TrainingError::InvalidConfig("trainer.iteration_count must be >= 1".to_string()));
        }
        if self.context_size == 0 {
            return Err(TrainingError::InvalidConfig("trainer.context_size must be >= 1".to_string()));
        }
        if self.max_samples == 0 {
            return Err(TrainingError::InvalidConfig("trainer.max_samples must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tune_for_host_disables_memory_optimization_on_roomy_hosts() {
        let config = TrainerConfig::default().tune_for_host(32, 1_100_000_000);
        assert!(!config.memory_optimized);
    }

    #[test]
    fn test_tune_for_host_keeps_memory_optimization_for_large_models() {
        assert!(TrainerConfig::default().tune_for_host(64, 7_000_000_000).memory_optimized);
        assert!(TrainerConfig::default().tune_for_host(16, 1_100_000_000).memory_optimized);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = TrainerConfig { batch_size: 0, ..Default::default() };
        assert!(config.validate().is_err());
        assert!(TrainerConfig::default().validate().is_ok());
    }
}
