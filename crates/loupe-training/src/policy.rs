//! Per-event decision policies.
//!
//! Every policy here is a pure function of its inputs. The controller asks a
//! [`ProgressPlanner`] what to do for each [`ProgressEvent`] and then carries
//! the resulting [`ProgressPlan`] out; the `loupe replay` command uses the same
//! planner to show those decisions without a trainer.

use crate::progress::{format_duration, ProgressEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    LossFloorReached { loss: f64, floor: f64 },
    MaxDurationExceeded { elapsed_secs: u64, limit_secs: u64 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LossFloorReached { loss, floor } => {
                write!(f, "minimum loss reached ({loss} <= {floor})")
            }
            Self::MaxDurationExceeded { elapsed_secs, limit_secs } => write!(
                f,
                "maximum training duration reached ({} > {})",
                format_duration(Duration::from_secs(*elapsed_secs)),
                format_duration(Duration::from_secs(*limit_secs)),
            ),
        }
    }
}

/// Early-stop conditions, checked on every progress event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoppingPolicy {
    pub loss_floor: f64,
    pub max_duration: Duration,
}

impl StoppingPolicy {
    #[must_use]
    pub fn new(loss_floor: f64, max_duration: Duration) -> Self {
        Self { loss_floor, max_duration }
    }

    /// The first reported loss is too noisy to stop on, hence `iteration > 1`.
    #[must_use]
    pub fn evaluate(&self, iteration: u64, loss: f64, elapsed: Duration) -> Option<StopReason> {
        if iteration > 1 && loss <= self.loss_floor {
            return Some(StopReason::LossFloorReached { loss, floor: self.loss_floor });
        }
        if elapsed > self.max_duration {
            return Some(StopReason::MaxDurationExceeded {
                elapsed_secs: elapsed.as_secs(),
                limit_secs: self.max_duration.as_secs(),
            });
        }
        None
    }

    #[must_use]
    pub fn should_stop(&self, iteration: u64, loss: f64, elapsed: Duration) -> bool {
        self.evaluate(iteration, loss, elapsed).is_some()
    }
}

/// Fires every `every` iterations. A zero period never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationCadence {
    every: u64,
}

impl IterationCadence {
    #[must_use]
    pub fn every(every: u64) -> Self {
        Self { every }
    }

    #[must_use]
    pub fn is_due(&self, iteration: u64) -> bool {
        self.every > 0 && iteration % self.every == 0
    }
}

/// Candidate evaluation: periodic, plus once more on the final event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationCadence {
    periodic: IterationCadence,
}

impl EvaluationCadence {
    #[must_use]
    pub fn every(every: u64) -> Self {
        Self { periodic: IterationCadence::every(every) }
    }

    #[must_use]
    pub fn is_due(&self, event: &ProgressEvent) -> bool {
        self.periodic.is_due(event.iteration) || event.is_final()
    }
}

/// Skips best-loss snapshots while the loss is still far from useful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestLossGate {
    pub evaluate_below: f64,
}

impl BestLossGate {
    #[must_use]
    pub fn admits(&self, loss: f64) -> bool {
        loss < self.evaluate_below
    }
}

/// What the controller should do for one progress event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressPlan {
    pub stop: Option<StopReason>,
    pub best_loss_improved: bool,
    pub save_best_loss: bool,
    pub save_latest: bool,
    pub save_recovery: bool,
}

impl ProgressPlan {
    /// Whether a candidate adapter will be written, and therefore swept.
    #[must_use]
    pub fn sweeps(&self) -> bool {
        self.save_best_loss || self.save_latest
    }
}

#[derive(Debug, Clone)]
pub struct ProgressPlanner {
    pub stopping: StoppingPolicy,
    pub evaluation: EvaluationCadence,
    pub recovery: IterationCadence,
    pub best_loss_gate: BestLossGate,
}

impl ProgressPlanner {
    #[must_use]
    pub fn plan(&self, event: &ProgressEvent, best_observed_loss: f64) -> ProgressPlan {
        let stop = self.stopping.evaluate(event.iteration, event.loss, event.elapsed);

        // Iteration 0 is reported before any training happened.
        if event.iteration == 0 {
            return ProgressPlan { stop, ..ProgressPlan::default() };
        }

        let best_loss_improved = event.best_loss < best_observed_loss;
        ProgressPlan {
            stop,
            best_loss_improved,
            save_best_loss: best_loss_improved && self.best_loss_gate.admits(event.loss),
            save_latest: self.evaluation.is_due(event),
            save_recovery: self.recovery.is_due(event.iteration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3_600);

    fn policy() -> StoppingPolicy {
        StoppingPolicy::new(0.01, 24 * HOUR)
    }

    fn event(iteration: u64, loss: f64, best_loss: f64) -> ProgressEvent {
        ProgressEvent {
            iteration,
            iteration_count: 1000,
            epoch: 0,
            percentage: iteration as f64 / 10.0,
            loss,
            best_loss,
            elapsed: Duration::from_secs(iteration * 5),
            remaining: None,
            next_sample: 0,
            sample_count: 1000,
        }
    }

    fn planner() -> ProgressPlanner {
        ProgressPlanner {
            stopping: policy(),
            evaluation: EvaluationCadence::every(10),
            recovery: IterationCadence::every(20),
            best_loss_gate: BestLossGate { evaluate_below: 2.0 },
        }
    }

    #[test]
    fn test_loss_floor_sequence_stops_on_fourth_iteration() {
        let losses = [3.0, 1.8, 0.9, 0.009];
        let decisions: Vec<bool> = losses
            .iter()
            .enumerate()
            .map(|(i, &loss)| policy().should_stop(i as u64 + 1, loss, HOUR))
            .collect();
        assert_eq!(decisions, vec![false, false, false, true]);
    }

    #[test]
    fn test_loss_floor_ignored_on_first_iteration() {
        assert!(!policy().should_stop(1, 0.001, HOUR));
        assert!(!policy().should_stop(0, 0.0, HOUR));
        assert!(policy().should_stop(2, 0.01, HOUR));
    }

    #[test]
    fn test_duration_trigger_independent_of_loss() {
        let reason = policy().evaluate(7, 5.0, 25 * HOUR);
        assert!(matches!(reason, Some(StopReason::MaxDurationExceeded { elapsed_secs: 90_000, limit_secs: 86_400 })));
        assert!(!policy().should_stop(7, 5.0, 24 * HOUR));
    }

    #[test]
    fn test_either_trigger_is_sufficient() {
        let p = policy();
        assert!(p.should_stop(5, 0.001, Duration::ZERO));
        assert!(p.should_stop(5, 9.0, 30 * HOUR));
        assert!(p.should_stop(5, 0.001, 30 * HOUR));
        assert!(!p.should_stop(5, 9.0, HOUR));
        // Loss is reported first when both hold.
        assert!(matches!(p.evaluate(5, 0.001, 30 * HOUR), Some(StopReason::LossFloorReached { .. })));
    }

    #[test]
    fn test_policy_is_pure() {
        let p = policy();
        for _ in 0..3 {
            assert_eq!(p.evaluate(3, 0.5, HOUR), None);
            assert!(p.should_stop(3, 0.005, HOUR));
        }
    }

    #[test]
    fn test_iteration_cadence() {
        let c = IterationCadence::every(10);
        assert!(c.is_due(10));
        assert!(c.is_due(20));
        assert!(!c.is_due(15));
        assert!(!IterationCadence::every(0).is_due(10));
    }

    #[test]
    fn test_evaluation_cadence_fires_on_final_event() {
        let c = EvaluationCadence::every(10);
        let mut last = event(997, 0.3, 0.3);
        assert!(!c.is_due(&last));
        last.percentage = 100.0;
        assert!(c.is_due(&last));
    }

    #[test]
    fn test_plan_skips_everything_but_stop_on_iteration_zero() {
        let plan = planner().plan(&event(0, 4.0, 4.0), f64::INFINITY);
        assert_eq!(plan, ProgressPlan::default());
    }

    #[test]
    fn test_plan_gates_best_loss_snapshot() {
        let p = planner();
        let early = p.plan(&event(3, 2.5, 2.5), 3.0);
        assert!(early.best_loss_improved);
        assert!(!early.save_best_loss);
        assert!(!early.sweeps());

        let useful = p.plan(&event(4, 1.5, 1.5), 2.5);
        assert!(useful.best_loss_improved);
        assert!(useful.save_best_loss);
        assert!(useful.sweeps());

        let stale = p.plan(&event(5, 1.7, 1.5), 1.5);
        assert!(!stale.best_loss_improved);
        assert!(!stale.save_best_loss);
    }

    #[test]
    fn test_plan_cadences_are_independent() {
        let p = planner();
        let ten = p.plan(&event(10, 1.0, 1.0), 1.0);
        assert!(ten.save_latest);
        assert!(!ten.save_recovery);

        let twenty = p.plan(&event(20, 1.0, 1.0), 1.0);
        assert!(twenty.save_latest);
        assert!(twenty.save_recovery);
    }

    #[test]
    fn test_stop_reason_display() {
        let reason = StopReason::MaxDurationExceeded { elapsed_secs: 90_000, limit_secs: 86_400 };
        assert_eq!(
            reason.to_string(),
            "maximum training duration reached (01.01:00:00 > 01.00:00:00)"
        );
    }
}
