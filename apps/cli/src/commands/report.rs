//! Report command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use loupe_training::{ExperimentLayout, ExperimentManifest};
use std::path::PathBuf;

pub async fn execute(dir: PathBuf, json: bool) -> Result<()> {
    let path = ExperimentLayout::new(dir).manifest_path();
    let manifest = ExperimentManifest::read(&path)
        .with_context(|| format!("No experiment manifest found at {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Experiment {}", manifest.experiment_id).bold().cyan());
    println!();
    println!("  Trainer:          {}", manifest.trainer);
    println!("  Started:          {}", manifest.started_at.to_rfc3339().dimmed());
    println!("  Finished:         {}", manifest.finished_at.to_rfc3339().dimmed());
    println!(
        "  Evaluation set:   {} samples, seed {} ({})",
        manifest.evaluation_set.sample_count,
        manifest.evaluation_set.seed,
        manifest.evaluation_set.fingerprint.dimmed()
    );
    println!("  Initial accuracy: {:.2}%", manifest.initial_accuracy);
    match manifest.best_scale {
        Some(scale) => println!(
            "  Best accuracy:    {} with scale {}",
            format!("{:.2}%", manifest.best_accuracy).green().bold(),
            scale
        ),
        None => println!("  Best accuracy:    {}", "no improvement over the initial model".yellow()),
    }
    if let Some(loss) = manifest.best_loss {
        println!("  Best loss:        {loss:.4}");
    }
    if let Some(reason) = &manifest.stop_reason {
        println!("  Stopped early:    {reason}");
    }

    println!();
    println!("{:<18} {:<18} {}", "Kind", "SHA-256", "Path");
    println!("{}", "─".repeat(90));
    for artifact in &manifest.artifacts {
        println!(
            "{:<18} {:<18} {}",
            format!("{:?}", artifact.kind),
            artifact.sha256.get(..16).unwrap_or(&artifact.sha256),
            artifact.path.display().to_string().dimmed()
        );
    }
    println!();
    Ok(())
}
