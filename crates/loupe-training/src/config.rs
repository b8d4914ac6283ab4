//! Experiment configuration, loadable from TOML.
//!
//! Every section is `#[serde(default)]`, so a partial file only overrides the
//! keys it names.

use crate::error::{TrainingError, TrainingResult};
use crate::policy::{BestLossGate, EvaluationCadence, IterationCadence, ProgressPlanner, StoppingPolicy};
use crate::trainer::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub stopping: StoppingConfig,
    pub evaluation: EvaluationConfig,
    pub checkpoint: CheckpointConfig,
    pub trainer: TrainerConfig,
    pub finalize: FinalizeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingConfig {
    pub loss_floor: f64,
    pub max_duration_secs: u64,
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self { loss_floor: 0.01, max_duration_secs: 24 * 60 * 60 }
    }
}

impl StoppingConfig {
    #[must_use]
    pub fn policy(&self) -> StoppingPolicy {
        StoppingPolicy::new(self.loss_floor, Duration::from_secs(self.max_duration_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Sweep the latest adapter every N iterations (and on the final event).
    pub every_iterations: u64,
    /// Adapter scales tried on every sweep, in order.
    pub scales: Vec<f32>,
    /// Best-loss adapters are only snapshotted once the loss is below this.
    pub evaluate_below_loss: f64,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            every_iterations: 10,
            scales: vec![0.75, 1.0, 1.25, 1.6],
            evaluate_below_loss: 2.0,
            max_samples: 300,
            seed: 2524,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
    pub recovery_every_iterations: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("experiment"), recovery_every_iterations: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    pub output: PathBuf,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self { output: PathBuf::from("merged_model.bin") }
    }
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> TrainingResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TrainingError::InvalidConfig(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Self::load`], but falls back to defaults when the file is missing.
    pub fn load_or_default(path: &Path) -> TrainingResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!("config file '{}' not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if !self.stopping.loss_floor.is_finite() || self.stopping.loss_floor < 0.0 {
            return Err(invalid("stopping.loss_floor must be a finite value >= 0"));
        }
        if self.stopping.max_duration_secs == 0 {
            return Err(invalid("stopping.max_duration_secs must be > 0"));
        }

        if self.evaluation.every_iterations == 0 {
            return Err(invalid("evaluation.every_iterations must be > 0"));
        }
        if self.evaluation.scales.is_empty() {
            return Err(invalid("evaluation.scales must not be empty"));
        }
        if self.evaluation.scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(invalid("evaluation.scales must all be finite and > 0"));
        }
        if self.evaluation.evaluate_below_loss.is_nan() || self.evaluation.evaluate_below_loss <= 0.0 {
            return Err(invalid("evaluation.evaluate_below_loss must be > 0"));
        }
        if self.evaluation.max_samples == 0 {
            return Err(invalid("evaluation.max_samples must be > 0"));
        }

        if self.checkpoint.recovery_every_iterations == 0 {
            return Err(invalid("checkpoint.recovery_every_iterations must be > 0"));
        }
        if self.checkpoint.dir.as_os_str().is_empty() {
            return Err(invalid("checkpoint.dir must not be empty"));
        }
        if self.finalize.output.as_os_str().is_empty() {
            return Err(invalid("finalize.output must not be empty"));
        }

        self.trainer.validate()
    }

    #[must_use]
    pub fn planner(&self) -> ProgressPlanner {
        ProgressPlanner {
            stopping: self.stopping.policy(),
            evaluation: EvaluationCadence::every(self.evaluation.every_iterations),
            recovery: IterationCadence::every(self.checkpoint.recovery_every_iterations),
            best_loss_gate: BestLossGate { evaluate_below: self.evaluation.evaluate_below_loss },
        }
    }

    pub fn to_toml(&self) -> TrainingResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// All defaults as TOML, for seeding a new config file.
    pub fn default_toml() -> TrainingResult<String> {
        Self::default().to_toml()
    }
}

fn invalid(message: &str) -> TrainingError {
    TrainingError::InvalidConfig(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        ExperimentConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ExperimentConfig = toml::from_str(
            r#"
[stopping]
loss_floor = 0.05

[trainer]
batch_size = 16
"#,
        )
        .unwrap();
        assert!((config.stopping.loss_floor - 0.05).abs() < 1e-12);
        assert_eq!(config.stopping.max_duration_secs, 86_400);
        assert_eq!(config.trainer.batch_size, 16);
        assert_eq!(config.trainer.iteration_count, 1000);
        assert_eq!(config.evaluation.scales, vec![0.75, 1.0, 1.25, 1.6]);
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let text = ExperimentConfig::default_toml().unwrap();
        let config: ExperimentConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("loupe.toml");
        std::fs::write(&path, "[evaluation]\nscales = []\n").unwrap();
        let err = ExperimentConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("evaluation.scales"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = ExperimentConfig::load_or_default(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: [fn(&mut ExperimentConfig); 8] = [
            |c| c.stopping.loss_floor = -1.0,
            |c| c.stopping.max_duration_secs = 0,
            |c| c.evaluation.every_iterations = 0,
            |c| c.evaluation.scales = vec![1.0, f32::NAN],
            |c| c.evaluation.scales = vec![0.0],
            |c| c.evaluation.max_samples = 0,
            |c| c.checkpoint.recovery_every_iterations = 0,
            |c| c.trainer.context_size = 0,
        ];
        for mutate in cases {
            let mut config = ExperimentConfig::default();
            mutate(&mut config);
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_planner_uses_configured_cadences() {
        let mut config = ExperimentConfig::default();
        config.checkpoint.recovery_every_iterations = 50;
        let planner = config.planner();
        assert!(planner.recovery.is_due(50));
        assert!(!planner.recovery.is_due(10));
        assert_eq!(planner.stopping.max_duration, Duration::from_secs(86_400));
    }
}
