//! Loupe Training
//!
//! Supervision primitives for adapter fine-tuning experiments:
//! - Watching an opaque `Trainer` through its progress stream
//! - Deciding when to stop (`StoppingPolicy`) and when to snapshot (`ProgressPlanner`)
//! - Scoring candidate adapters on a fixed held-out set (`EvaluationHarness`)
//! - Sweeping adapter scales and promoting the best one (`CandidateSweepEvaluator`)
//! - Orchestrating a whole run end to end (`ExperimentController`)

pub mod artifacts;
pub mod config;
pub mod controller;
pub mod dataset;
pub mod error;
pub mod finalize;
pub mod harness;
pub mod layout;
pub mod policy;
pub mod progress;
pub mod store;
pub mod sweep;
pub mod trainer;

pub use artifacts::{ArtifactKind, ExperimentArtifact, ExperimentManifest};
pub use config::{CheckpointConfig, EvaluationConfig, ExperimentConfig, FinalizeConfig, StoppingConfig};
pub use controller::{
    ExperimentController, ExperimentOutcome, ExperimentPhase, ExperimentReport, ProgressDecision, Promotion, RunState,
};
pub use dataset::{read_jsonl_samples, write_jsonl_samples, EvaluationSample, EvaluationSet};
pub use error::{TrainingError, TrainingResult};
pub use finalize::Finalizer;
pub use harness::{ArtifactLoader, ArtifactRef, Classifier, Evaluation, EvaluationHarness};
pub use layout::ExperimentLayout;
pub use policy::{
    BestLossGate, EvaluationCadence, IterationCadence, ProgressPlan, ProgressPlanner, StopReason, StoppingPolicy,
};
pub use progress::{ExperimentEvent, ExperimentReporter, ProgressEvent, StopToken, TracingReporter};
pub use store::{CheckpointStore, FsCheckpointStore};
pub use sweep::{CandidateSweepEvaluator, ScaleOutcome, SweepResult};
pub use trainer::{SnapshotKind, SnapshotSource, Trainer, TrainerConfig};
