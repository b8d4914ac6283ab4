use crate::error::{TrainingError, TrainingResult};
use crate::policy::StopReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Adapter,
    TrainerCheckpoint,
    MergedModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSetInfo {
    pub fingerprint: String,
    pub sample_count: usize,
    pub seed: u64,
}

/// Record of a finished experiment, written next to its snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentManifest {
    pub experiment_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trainer: String,
    pub evaluation_set: EvaluationSetInfo,
    pub initial_accuracy: f64,
    pub best_accuracy: f64,
    pub best_scale: Option<f32>,
    #[serde(default)]
    pub best_loss: Option<f64>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    pub artifacts: Vec<ExperimentArtifact>,
}

impl ExperimentManifest {
    pub fn write(&self, path: &Path) -> TrainingResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: &Path) -> TrainingResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Streams the file through the hasher; merged models do not fit in memory.
pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<ExperimentArtifact> {
    if !path.exists() {
        return Err(TrainingError::storage(
            &path.display().to_string(),
            anyhow::anyhow!("artifact path does not exist"),
        ));
    }

    let hash = sha256_file(&path)?;
    Ok(ExperimentArtifact { kind, path, sha256: hash })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_make_artifact_hashes_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("adapter.bin");
        std::fs::write(&path, b"abc").unwrap();

        let artifact = make_artifact(ArtifactKind::Adapter, path).unwrap();
        assert_eq!(artifact.sha256, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn test_sha256_file_spans_many_reads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.bin");
        let bytes: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(sha256_file(&path).unwrap(), hex::encode(Sha256::digest(&bytes)));
    }

    #[test]
    fn test_manifest_write_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("experiment_manifest.json");
        let manifest = ExperimentManifest {
            experiment_id: "exp-2".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            trainer: "scripted".to_string(),
            evaluation_set: EvaluationSetInfo { fingerprint: "f".to_string(), sample_count: 1, seed: 1 },
            initial_accuracy: 0.0,
            best_accuracy: 100.0,
            best_scale: Some(1.0),
            best_loss: Some(0.5),
            stop_reason: None,
            artifacts: Vec::new(),
        };

        manifest.write(&path).unwrap();
        assert_eq!(ExperimentManifest::read(&path).unwrap().experiment_id, "exp-2");
    }

    #[test]
    fn test_make_artifact_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        assert!(make_artifact(ArtifactKind::MergedModel, temp.path().join("missing.bin")).is_err());
    }

    #[test]
    fn test_manifest_roundtrip_without_optional_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("experiment_manifest.json");
        let manifest = ExperimentManifest {
            experiment_id: "exp-1".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            trainer: "scripted".to_string(),
            evaluation_set: EvaluationSetInfo { fingerprint: "f".to_string(), sample_count: 300, seed: 2524 },
            initial_accuracy: 46.0,
            best_accuracy: 96.0,
            best_scale: Some(1.0),
            best_loss: None,
            stop_reason: None,
            artifacts: Vec::new(),
        };
        manifest.write(&path).unwrap();

        let read = ExperimentManifest::read(&path).unwrap();
        assert_eq!(read.experiment_id, "exp-1");
        assert_eq!(read.best_scale, Some(1.0));
        assert!(read.stop_reason.is_none());
    }
}
