//! Replay command implementation.
//!
//! Feeds a recorded progress log through the same [`ProgressPlanner`] the
//! controller uses, without a trainer or any evaluation.

use super::config_path;
use anyhow::{Context, Result};
use colored::Colorize;
use loupe_training::{ExperimentConfig, ExperimentLayout, ProgressEvent, ProgressPlan, ProgressPlanner};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct ReplayStep {
    pub iteration: u64,
    pub loss: f64,
    pub best_loss: f64,
    pub plan: ProgressPlan,
    /// Adapter that would be swept for this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<&'static str>,
}

pub async fn execute(events: PathBuf, config: Option<PathBuf>, json: bool) -> Result<()> {
    let config = ExperimentConfig::load_or_default(&config_path(config))?;
    let events = read_events(&events)?;
    let steps = replay(&config.planner(), &events);

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Replayed {} of {} events", steps.len(), events.len()).bold().cyan());
    println!();
    println!("{:<10} {:<10} {:<10} {}", "Iteration", "Loss", "Best", "Actions");
    println!("{}", "─".repeat(72));
    for step in &steps {
        println!(
            "{:<10} {:<10.4} {:<10.4} {}",
            step.iteration,
            step.loss,
            step.best_loss,
            describe(step).dimmed()
        );
    }
    println!();

    match steps.last().and_then(|s| s.plan.stop.as_ref()) {
        Some(reason) => println!("  {} {}", "Stop:".yellow().bold(), reason),
        None => println!("  {}", "No stop condition triggered".green()),
    }
    Ok(())
}

/// Plan every event in order, ending after the first stop decision or the final event.
pub fn replay(planner: &ProgressPlanner, events: &[ProgressEvent]) -> Vec<ReplayStep> {
    let mut best_observed_loss = f64::INFINITY;
    let mut steps = Vec::new();

    for event in events {
        let plan = planner.plan(event, best_observed_loss);
        if plan.best_loss_improved {
            best_observed_loss = event.best_loss;
        }
        let sweep = if plan.save_latest {
            Some(ExperimentLayout::LATEST_ADAPTER)
        } else if plan.save_best_loss {
            Some(ExperimentLayout::BEST_LOSS_ADAPTER)
        } else {
            None
        };
        let done = plan.stop.is_some() || event.is_final();
        steps.push(ReplayStep { iteration: event.iteration, loss: event.loss, best_loss: event.best_loss, plan, sweep });
        if done {
            break;
        }
    }

    steps
}

fn describe(step: &ReplayStep) -> String {
    let mut actions = Vec::new();
    if step.plan.stop.is_some() {
        actions.push("stop".to_string());
    }
    if step.plan.save_best_loss {
        actions.push("save best-loss adapter".to_string());
    }
    if step.plan.save_latest {
        actions.push("save latest adapter".to_string());
    }
    if let Some(candidate) = step.sweep {
        actions.push(format!("sweep {candidate}"));
    }
    if step.plan.save_recovery {
        actions.push("save recovery checkpoint".to_string());
    }
    if actions.is_empty() { "-".to_string() } else { actions.join(", ") }
}

fn read_events(path: &Path) -> Result<Vec<ProgressEvent>> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut events = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse progress event on line {}", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(iteration: u64, loss: f64, best_loss: f64) -> ProgressEvent {
        ProgressEvent {
            iteration,
            iteration_count: 100,
            epoch: 0,
            percentage: iteration as f64,
            loss,
            best_loss,
            elapsed: Duration::from_secs(iteration),
            remaining: None,
            next_sample: 0,
            sample_count: 0,
        }
    }

    #[test]
    fn test_replay_stops_at_first_stop_decision() {
        let planner = ExperimentConfig::default().planner();
        let events = [event(1, 3.0, 3.0), event(2, 1.8, 1.8), event(3, 0.9, 0.9), event(4, 0.009, 0.009), event(5, 0.001, 0.001)];

        let steps = replay(&planner, &events);

        assert_eq!(steps.len(), 4);
        assert!(steps[3].plan.stop.is_some());
        assert_eq!(steps[1].sweep, Some(ExperimentLayout::BEST_LOSS_ADAPTER));
        assert_eq!(steps[0].sweep, None);
    }

    #[test]
    fn test_replay_ends_at_final_event() {
        let planner = ExperimentConfig::default().planner();
        let events = [event(99, 1.0, 1.0), event(100, 1.0, 1.0), event(101, 0.5, 0.5)];

        let steps = replay(&planner, &events);

        assert_eq!(steps.iter().map(|s| s.iteration).collect::<Vec<_>>(), vec![99, 100]);
        assert!(steps[1].plan.stop.is_none());
        assert_eq!(steps[1].sweep, Some(ExperimentLayout::LATEST_ADAPTER));
    }

    #[test]
    fn test_latest_adapter_wins_over_best_loss() {
        let planner = ExperimentConfig::default().planner();
        let steps = replay(&planner, &[event(10, 1.0, 1.0)]);
        assert!(steps[0].plan.save_best_loss);
        assert_eq!(steps[0].sweep, Some(ExperimentLayout::LATEST_ADAPTER));
        assert_eq!(describe(&steps[0]), "save best-loss adapter, save latest adapter, sweep adapter.last.bin, save recovery checkpoint");
    }

    #[test]
    fn test_best_loss_tracks_across_events() {
        let planner = ExperimentConfig::default().planner();
        let steps = replay(&planner, &[event(1, 1.0, 1.0), event(2, 1.5, 1.0), event(3, 0.5, 0.5)]);
        let improved: Vec<bool> = steps.iter().map(|s| s.plan.best_loss_improved).collect();
        assert_eq!(improved, vec![true, false, true]);
    }
}
