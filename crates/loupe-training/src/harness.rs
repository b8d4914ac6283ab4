use crate::dataset::EvaluationSet;
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A scorable unit: the base model, optionally with an adapter applied at a scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub adapter: Option<PathBuf>,
    pub scale: f32,
}

impl ArtifactRef {
    #[must_use]
    pub fn base() -> Self {
        Self { adapter: None, scale: 1.0 }
    }

    pub fn adapter(path: impl Into<PathBuf>, scale: f32) -> Self {
        Self { adapter: Some(path.into()), scale }
    }

    #[must_use]
    pub fn adapter_path(&self) -> Option<&Path> {
        self.adapter.as_deref()
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.adapter {
            Some(path) => write!(f, "{}@{}", path.display(), self.scale),
            None => f.write_str("base model"),
        }
    }
}

/// A loaded artifact that predicts one label per input.
///
/// Whatever the loader acquired is released when the value is dropped.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, input: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait ArtifactLoader: Send + Sync {
    async fn load(&self, artifact: &ArtifactRef) -> anyhow::Result<Box<dyn Classifier>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Unrounded, in `[0, 100]`.
    pub accuracy_percent: f64,
    pub elapsed: Duration,
    pub sample_count: usize,
}

impl Evaluation {
    #[must_use]
    pub fn samples_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.sample_count as f64 / secs } else { f64::INFINITY }
    }
}

/// Scores artifacts against an evaluation set by exact label match.
#[derive(Clone)]
pub struct EvaluationHarness {
    loader: Arc<dyn ArtifactLoader>,
}

impl EvaluationHarness {
    #[must_use]
    pub fn new(loader: Arc<dyn ArtifactLoader>) -> Self {
        Self { loader }
    }

    pub async fn evaluate(&self, artifact: &ArtifactRef, samples: &EvaluationSet) -> TrainingResult<Evaluation> {
        if samples.is_empty() {
            return Err(TrainingError::Dataset("evaluation set must not be empty".to_string()));
        }

        let classifier = self
            .loader
            .load(artifact)
            .await
            .map_err(|source| TrainingError::ArtifactLoad { artifact: artifact.to_string(), source })?;

        let started = Instant::now();
        let mut success_count = 0usize;
        for sample in samples.iter() {
            let predicted = classifier
                .classify(&sample.input)
                .await
                .map_err(|source| TrainingError::Evaluation { artifact: artifact.to_string(), source })?;
            if predicted == sample.expected_label {
                success_count += 1;
            }
        }
        let elapsed = started.elapsed();

        Ok(Evaluation {
            accuracy_percent: success_count as f64 / samples.len() as f64 * 100.0,
            elapsed,
            sample_count: samples.len(),
        })
    }
}
