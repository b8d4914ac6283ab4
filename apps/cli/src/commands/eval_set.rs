//! Evaluation set command implementation.

use super::config_path;
use anyhow::{Context, Result};
use colored::Colorize;
use loupe_training::{read_jsonl_samples, write_jsonl_samples, EvaluationSet, ExperimentConfig};
use std::path::PathBuf;

/// Flags override the `[evaluation]` section of the config file.
pub async fn execute(
    dataset: PathBuf,
    out: PathBuf,
    config: Option<PathBuf>,
    max_samples: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let evaluation = ExperimentConfig::load_or_default(&config_path(config))?.evaluation;
    let max_samples = max_samples.unwrap_or(evaluation.max_samples);
    let seed = seed.unwrap_or(evaluation.seed);

    let rows = read_jsonl_samples(&dataset).with_context(|| format!("Failed to read {}", dataset.display()))?;
    let available = rows.len();
    let set = EvaluationSet::build(rows, max_samples, seed)?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_jsonl_samples(&out, set.samples())?;

    println!("{}", "Evaluation set created".bold().green());
    println!("  Samples:     {} of {}", set.len().to_string().cyan(), available);
    println!("  Seed:        {}", seed);
    println!("  Fingerprint: {}", set.fingerprint().dimmed());
    println!("  Written to:  {}", out.display().to_string().dimmed());
    Ok(())
}
