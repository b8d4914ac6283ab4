use crate::controller::{Promotion, RunState};
use crate::dataset::EvaluationSet;
use crate::error::TrainingError;
use crate::harness::{ArtifactRef, EvaluationHarness};
use crate::progress::{ExperimentEvent, ExperimentReporter};
use crate::store::CheckpointStore;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleOutcome {
    pub scale: f32,
    pub accuracy: f64,
    pub improved: bool,
}

#[derive(Debug)]
pub struct SweepResult {
    pub improved: bool,
    /// Best scale and accuracy of the run after this sweep.
    pub best_scale: Option<f32>,
    pub best_accuracy: f64,
    /// Scales evaluated before the sweep ended, in grid order.
    pub outcomes: Vec<ScaleOutcome>,
    /// Set when an evaluation failed and the rest of the grid was skipped.
    pub failure: Option<TrainingError>,
}

/// Evaluates one candidate adapter at every scale of a grid.
///
/// Each grid point is compared against the running best, which is updated
/// in place as soon as a scale beats it. Every strict improvement promotes the
/// candidate to the best-accuracy name, so one sweep may promote more than once.
/// A failed promotion leaves [`Promotion::Pending`] on the run state.
pub struct CandidateSweepEvaluator {
    harness: EvaluationHarness,
    store: Arc<dyn CheckpointStore>,
    reporter: Arc<dyn ExperimentReporter>,
    best_name: String,
}

impl CandidateSweepEvaluator {
    pub fn new(
        harness: EvaluationHarness,
        store: Arc<dyn CheckpointStore>,
        reporter: Arc<dyn ExperimentReporter>,
        best_name: impl Into<String>,
    ) -> Self {
        Self { harness, store, reporter, best_name: best_name.into() }
    }

    pub async fn sweep(
        &self,
        candidate: &str,
        scales: &[f32],
        samples: &EvaluationSet,
        best: &mut RunState,
    ) -> SweepResult {
        let path = self.store.locate(candidate);
        let mut outcomes = Vec::with_capacity(scales.len());
        let mut improved = false;
        let mut failure = None;

        for &scale in scales {
            debug!("evaluating {candidate} with scale {scale}");
            let evaluation = match self.harness.evaluate(&ArtifactRef::adapter(&path, scale), samples).await {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    self.reporter.on_event(ExperimentEvent::EvaluationFailed {
                        candidate: candidate.to_string(),
                        scale,
                        message: e.to_string(),
                    });
                    failure = Some(e);
                    break;
                }
            };

            let accuracy = evaluation.accuracy_percent;
            let adopted = accuracy > best.best_observed_accuracy;
            if adopted {
                best.adopt(accuracy, scale);
                improved = true;
                self.reporter.on_event(ExperimentEvent::Improved {
                    candidate: candidate.to_string(),
                    scale,
                    accuracy,
                    samples_per_second: evaluation.samples_per_second(),
                });
                best.promotion = Promotion::Pending(candidate.to_string());
                self.settle(best).await;
            } else {
                self.reporter.on_event(ExperimentEvent::CandidateEvaluated {
                    candidate: candidate.to_string(),
                    scale,
                    accuracy,
                    best_accuracy: best.best_observed_accuracy,
                    best_scale: best.best_scale,
                    initial_accuracy: best.initial_accuracy,
                    samples_per_second: evaluation.samples_per_second(),
                });
            }
            outcomes.push(ScaleOutcome { scale, accuracy, improved: adopted });
        }

        // The candidate is unchanged until the next snapshot, so retry while it still matches.
        if best.promotion == Promotion::Pending(candidate.to_string()) {
            self.settle(best).await;
        }

        SweepResult {
            improved,
            best_scale: best.best_scale,
            best_accuracy: best.best_observed_accuracy,
            outcomes,
            failure,
        }
    }

    /// Promote a pending best adapter. Returns whether the store now holds the recorded best.
    pub async fn settle(&self, best: &mut RunState) -> bool {
        let Promotion::Pending(candidate) = best.promotion.clone() else {
            return best.promotion == Promotion::Settled;
        };
        let promoted = self.store.promote(&candidate, &self.best_name).await;
        match promoted {
            Ok(_) => {
                best.promotion = Promotion::Settled;
                true
            }
            Err(e) => {
                self.reporter.on_event(ExperimentEvent::StorageFailed {
                    name: self.best_name.clone(),
                    message: e.to_string(),
                });
                false
            }
        }
    }
}
