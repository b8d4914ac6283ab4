//! Experiment orchestration.
//!
//! [`ExperimentController::run`] measures the untrained baseline, starts the
//! trainer, reacts to each progress event in order (stop check, best-loss
//! snapshot, candidate sweep, recovery checkpoint) and finally merges the best
//! adapter at its best scale into a deployable model.

use crate::artifacts::{make_artifact, ArtifactKind, EvaluationSetInfo, ExperimentManifest};
use crate::config::ExperimentConfig;
use crate::dataset::EvaluationSet;
use crate::error::{TrainingError, TrainingResult};
use crate::finalize::Finalizer;
use crate::harness::{ArtifactLoader, ArtifactRef, EvaluationHarness};
use crate::layout::ExperimentLayout;
use crate::policy::{ProgressPlanner, StopReason};
use crate::progress::{ExperimentEvent, ExperimentReporter, ProgressEvent, StopToken, TracingReporter};
use crate::store::CheckpointStore;
use crate::sweep::{CandidateSweepEvaluator, SweepResult};
use crate::trainer::{SnapshotKind, Trainer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    Initializing,
    Running,
    /// A stop was requested; remaining events are drained without action.
    Stopping,
    /// The trainer reported its final event or ended its stream.
    Completed,
    Finalizing,
    Terminated,
}

/// Best-known state of one experiment run.
///
/// Created by [`ExperimentController::run`] after the baseline is measured and
/// dropped when the run returns; nothing carries over between runs.
#[derive(Debug, Clone)]
pub struct RunState {
    pub experiment_id: String,
    pub started_at: DateTime<Utc>,
    pub initial_accuracy: f64,
    pub best_observed_loss: f64,
    pub best_observed_accuracy: f64,
    /// Unset until a candidate beats the baseline.
    pub best_scale: Option<f32>,
    pub last_iteration: u64,
    pub stop_reason: Option<StopReason>,
    pub promotion: Promotion,
}

/// Whether the best-accuracy adapter in the store matches the recorded best.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Promotion {
    #[default]
    Settled,
    /// The named candidate holds the best adapter but has not been promoted yet.
    Pending(String),
    /// The candidate was overwritten before it could be promoted.
    Lost,
}

impl RunState {
    #[must_use]
    pub fn new(baseline_accuracy: f64) -> Self {
        Self {
            experiment_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            initial_accuracy: baseline_accuracy,
            best_observed_loss: f64::INFINITY,
            best_observed_accuracy: baseline_accuracy,
            best_scale: None,
            last_iteration: 0,
            stop_reason: None,
            promotion: Promotion::Settled,
        }
    }

    /// Record a new best. Callers check for strict improvement first.
    pub fn adopt(&mut self, accuracy: f64, scale: f32) {
        self.best_observed_accuracy = accuracy;
        self.best_scale = Some(scale);
    }
}

/// What the controller did in response to one progress event.
#[derive(Debug, Default)]
pub struct ProgressDecision {
    pub stop: Option<StopReason>,
    pub best_loss_saved: bool,
    pub latest_saved: bool,
    pub recovery_saved: bool,
    /// Which candidate was swept, and how it went.
    pub sweep: Option<(String, SweepResult)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExperimentOutcome {
    Finalized { output: PathBuf },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_id: String,
    pub initial_accuracy: f64,
    pub best_accuracy: f64,
    pub best_scale: Option<f32>,
    pub best_loss: Option<f64>,
    pub last_iteration: u64,
    pub stop_reason: Option<StopReason>,
    pub outcome: ExperimentOutcome,
}

impl ExperimentReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExperimentOutcome::Finalized { .. })
    }
}

pub struct ExperimentController {
    config: ExperimentConfig,
    planner: ProgressPlanner,
    harness: EvaluationHarness,
    store: Arc<dyn CheckpointStore>,
    finalizer: Arc<dyn Finalizer>,
    reporter: Arc<dyn ExperimentReporter>,
    phase: ExperimentPhase,
}

impl ExperimentController {
    pub fn new(
        config: ExperimentConfig,
        loader: Arc<dyn ArtifactLoader>,
        store: Arc<dyn CheckpointStore>,
        finalizer: Arc<dyn Finalizer>,
    ) -> TrainingResult<Self> {
        config.validate()?;
        Ok(Self {
            planner: config.planner(),
            harness: EvaluationHarness::new(loader),
            store,
            finalizer,
            reporter: Arc::new(TracingReporter),
            phase: ExperimentPhase::Initializing,
            config,
        })
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ExperimentReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn phase(&self) -> ExperimentPhase {
        self.phase
    }

    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run one experiment to completion.
    ///
    /// Returns `Err` when the baseline cannot be measured or the trainer fails;
    /// any other failure is reported through [`ExperimentOutcome::Failed`].
    pub async fn run<T: Trainer>(&mut self, trainer: &mut T, samples: &EvaluationSet) -> TrainingResult<ExperimentReport> {
        self.phase = ExperimentPhase::Initializing;
        let result = self.run_inner(trainer, samples).await;
        self.phase = ExperimentPhase::Terminated;
        result
    }

    async fn run_inner<T: Trainer>(&mut self, trainer: &mut T, samples: &EvaluationSet) -> TrainingResult<ExperimentReport> {
        info!(
            trainer = trainer.id(),
            samples = samples.len(),
            "computing initial model accuracy"
        );
        let baseline = self
            .harness
            .evaluate(&ArtifactRef::base(), samples)
            .await
            .map_err(|e| TrainingError::Baseline(Box::new(e)))?;
        self.reporter.on_event(ExperimentEvent::BaselineMeasured {
            accuracy: baseline.accuracy_percent,
            samples_per_second: baseline.samples_per_second(),
        });

        let mut state = RunState::new(baseline.accuracy_percent);

        let stop = StopToken::new();
        trainer.start(&self.config.trainer, stop.clone()).await.map_err(TrainingError::Trainer)?;
        self.phase = ExperimentPhase::Running;

        while let Some(event) = trainer.next_progress().await.map_err(TrainingError::Trainer)? {
            if self.phase != ExperimentPhase::Running {
                debug!(iteration = event.iteration, phase = ?self.phase, "ignoring progress event");
                continue;
            }

            let decision = self.on_progress(&mut state, &event, &*trainer, samples).await;
            if decision.stop.is_some() {
                stop.request();
                self.phase = ExperimentPhase::Stopping;
            } else if event.is_final() {
                self.phase = ExperimentPhase::Completed;
            }
        }
        if self.phase == ExperimentPhase::Running {
            self.phase = ExperimentPhase::Completed;
        }

        self.phase = ExperimentPhase::Finalizing;
        let outcome = self.finalize(&mut state, trainer.id(), samples).await;
        match &outcome {
            ExperimentOutcome::Finalized { output } => {
                self.reporter.on_event(ExperimentEvent::Finalized { output: output.clone() });
            }
            ExperimentOutcome::Failed { reason } => {
                self.reporter.on_event(ExperimentEvent::Failed { reason: reason.clone() });
            }
        }

        Ok(ExperimentReport {
            experiment_id: state.experiment_id,
            initial_accuracy: state.initial_accuracy,
            best_accuracy: state.best_observed_accuracy,
            best_scale: state.best_scale,
            best_loss: state.best_observed_loss.is_finite().then_some(state.best_observed_loss),
            last_iteration: state.last_iteration,
            stop_reason: state.stop_reason,
            outcome,
        })
    }

    /// React to one progress event. Every step completes before this returns.
    pub async fn on_progress<T: Trainer>(
        &self,
        state: &mut RunState,
        event: &ProgressEvent,
        trainer: &T,
        samples: &EvaluationSet,
    ) -> ProgressDecision {
        self.reporter.on_event(ExperimentEvent::Progress { event: event.clone() });
        state.last_iteration = event.iteration;

        let plan = self.planner.plan(event, state.best_observed_loss);
        let mut decision = ProgressDecision { stop: plan.stop.clone(), ..ProgressDecision::default() };

        if let Some(reason) = plan.stop {
            state.stop_reason = Some(reason.clone());
            self.reporter.on_event(ExperimentEvent::StopRequested { reason });
        }

        if plan.best_loss_improved {
            state.best_observed_loss = event.best_loss;
            self.reporter.on_event(ExperimentEvent::BestLoss { loss: event.best_loss });
        }

        let overwritten = match &state.promotion {
            Promotion::Pending(pending) => {
                (plan.save_best_loss && pending == ExperimentLayout::BEST_LOSS_ADAPTER)
                    || (plan.save_latest && pending == ExperimentLayout::LATEST_ADAPTER)
            }
            Promotion::Settled | Promotion::Lost => false,
        };
        if overwritten && !self.sweeper().settle(state).await {
            warn!("best adapter at scale {:?} is overwritten before it was promoted", state.best_scale);
            state.promotion = Promotion::Lost;
        }

        let mut candidate = None;
        if plan.save_best_loss && self.save(trainer, SnapshotKind::Adapter, ExperimentLayout::BEST_LOSS_ADAPTER).await {
            decision.best_loss_saved = true;
            candidate = Some(ExperimentLayout::BEST_LOSS_ADAPTER);
        }
        if plan.save_latest && self.save(trainer, SnapshotKind::Adapter, ExperimentLayout::LATEST_ADAPTER).await {
            decision.latest_saved = true;
            candidate = Some(ExperimentLayout::LATEST_ADAPTER);
        }

        if let Some(candidate) = candidate {
            let result = self.sweeper().sweep(candidate, &self.config.evaluation.scales, samples, state).await;
            if result.improved {
                self.save(trainer, SnapshotKind::TrainerCheckpoint, ExperimentLayout::BEST_CHECKPOINT).await;
            }
            decision.sweep = Some((candidate.to_string(), result));
        }

        if plan.save_recovery {
            decision.recovery_saved =
                self.save(trainer, SnapshotKind::TrainerCheckpoint, ExperimentLayout::RECOVERY_CHECKPOINT).await;
        }

        decision
    }

    fn sweeper(&self) -> CandidateSweepEvaluator {
        CandidateSweepEvaluator::new(
            self.harness.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.reporter),
            ExperimentLayout::BEST_ACCURACY_ADAPTER,
        )
    }

    /// Storage failures during the run are reported and otherwise ignored.
    async fn save<T: Trainer>(&self, trainer: &T, kind: SnapshotKind, name: &str) -> bool {
        match self.store.save(trainer, kind, name).await {
            Ok(_) => {
                self.reporter.on_event(ExperimentEvent::SnapshotSaved { name: name.to_string(), kind });
                true
            }
            Err(e) => {
                self.reporter.on_event(ExperimentEvent::StorageFailed { name: name.to_string(), message: e.to_string() });
                false
            }
        }
    }

    async fn finalize(&self, state: &mut RunState, trainer_id: &str, samples: &EvaluationSet) -> ExperimentOutcome {
        let promoted = self.sweeper().settle(state).await;
        let Some(scale) = state.best_scale else {
            return ExperimentOutcome::Failed {
                reason: format!(
                    "no candidate adapter exceeded the initial accuracy of {:.2}%",
                    state.initial_accuracy
                ),
            };
        };

        if !promoted {
            return ExperimentOutcome::Failed {
                reason: format!(
                    "best adapter ({:.2}% at scale {scale}) could not be promoted to {}",
                    state.best_observed_accuracy,
                    ExperimentLayout::BEST_ACCURACY_ADAPTER
                ),
            };
        }

        let adapter = self.store.locate(ExperimentLayout::BEST_ACCURACY_ADAPTER);
        if !self.store.exists(ExperimentLayout::BEST_ACCURACY_ADAPTER).await {
            return ExperimentOutcome::Failed {
                reason: format!("best adapter is missing at {}", adapter.display()),
            };
        }

        let output = self.config.finalize.output.clone();
        info!("creating merged model with scale {scale}");
        if let Err(e) = self.finalizer.merge(&adapter, scale, &output).await {
            return ExperimentOutcome::Failed { reason: TrainingError::Finalize(e).to_string() };
        }

        match self.write_manifest(state, trainer_id, samples, &output).await {
            Ok(path) => info!("experiment manifest written to {}", path.display()),
            Err(e) => warn!("failed to write experiment manifest: {e}"),
        }

        let output = std::path::absolute(&output).unwrap_or(output);
        ExperimentOutcome::Finalized { output }
    }

    /// Hashing reads whole artifacts, so it runs on the blocking pool.
    async fn write_manifest(
        &self,
        state: &RunState,
        trainer_id: &str,
        samples: &EvaluationSet,
        output: &Path,
    ) -> TrainingResult<PathBuf> {
        let mut manifest = ExperimentManifest {
            experiment_id: state.experiment_id.clone(),
            started_at: state.started_at,
            finished_at: Utc::now(),
            trainer: trainer_id.to_string(),
            evaluation_set: EvaluationSetInfo {
                fingerprint: samples.fingerprint(),
                sample_count: samples.len(),
                seed: samples.seed(),
            },
            initial_accuracy: state.initial_accuracy,
            best_accuracy: state.best_observed_accuracy,
            best_scale: state.best_scale,
            best_loss: state.best_observed_loss.is_finite().then_some(state.best_observed_loss),
            stop_reason: state.stop_reason.clone(),
            artifacts: Vec::new(),
        };
        let adapter = self.store.locate(ExperimentLayout::BEST_ACCURACY_ADAPTER);
        let checkpoint = self.store.locate(ExperimentLayout::BEST_CHECKPOINT);
        let output = output.to_path_buf();
        let path = self.store.locate(ExperimentLayout::MANIFEST);

        tokio::task::spawn_blocking(move || {
            manifest.artifacts.push(make_artifact(ArtifactKind::Adapter, adapter)?);
            if checkpoint.exists() {
                manifest.artifacts.push(make_artifact(ArtifactKind::TrainerCheckpoint, checkpoint)?);
            }
            if output.is_file() {
                manifest.artifacts.push(make_artifact(ArtifactKind::MergedModel, output)?);
            }
            manifest.write(&path)?;
            Ok::<_, TrainingError>(path)
        })
        .await
        .map_err(|e| TrainingError::Other(e.into()))?
    }
}
