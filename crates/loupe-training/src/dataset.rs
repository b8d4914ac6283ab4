use crate::error::{TrainingError, TrainingResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// One labeled example of the held-out evaluation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub input: String,
    pub expected_label: String,
}

impl EvaluationSample {
    pub fn new(input: impl Into<String>, expected_label: impl Into<String>) -> Self {
        Self { input: input.into(), expected_label: expected_label.into() }
    }
}

/// Fixed, read-only evaluation set shared by every evaluation of a run.
///
/// Cloning is cheap and never copies the samples, so every candidate is scored
/// against exactly the same data.
#[derive(Debug, Clone)]
pub struct EvaluationSet {
    samples: Arc<[EvaluationSample]>,
    seed: u64,
}

impl EvaluationSet {
    /// Shuffle `source` with `seed`, then keep at most `max_samples`.
    pub fn build(mut source: Vec<EvaluationSample>, max_samples: usize, seed: u64) -> TrainingResult<Self> {
        validate_samples(&source)?;
        source.shuffle(&mut StdRng::seed_from_u64(seed));
        source.truncate(max_samples);
        if source.is_empty() {
            return Err(TrainingError::Dataset("evaluation set must not be empty".to_string()));
        }
        Ok(Self { samples: source.into(), seed })
    }

    #[must_use]
    pub fn samples(&self) -> &[EvaluationSample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvaluationSample> {
        self.samples.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Content hash over the ordered samples.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for sample in self.samples.iter() {
            hasher.update(sample.input.as_bytes());
            hasher.update([0u8]);
            hasher.update(sample.expected_label.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

pub fn validate_samples(samples: &[EvaluationSample]) -> TrainingResult<()> {
    if samples.is_empty() {
        return Err(TrainingError::Dataset("evaluation samples must not be empty".to_string()));
    }
    for (idx, sample) in samples.iter().enumerate() {
        if sample.input.trim().is_empty() {
            return Err(TrainingError::Dataset(format!("sample[{idx}] input is empty")));
        }
        if sample.expected_label.trim().is_empty() {
            return Err(TrainingError::Dataset(format!("sample[{idx}] expected_label is empty")));
        }
    }
    Ok(())
}

pub fn read_jsonl_samples(path: &Path) -> TrainingResult<Vec<EvaluationSample>> {
    let contents = std::fs::read_to_string(path)?;
    let mut samples = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: EvaluationSample = serde_json::from_str(line).map_err(|e| {
            TrainingError::Dataset(format!("failed to parse jsonl line {}: {}", idx + 1, e))
        })?;
        samples.push(sample);
    }

    Ok(samples)
}

pub fn write_jsonl_samples(path: &Path, samples: &[EvaluationSample]) -> TrainingResult<()> {
    let mut out = String::new();
    for sample in samples {
        out.push_str(&serde_json::to_string(sample)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}
