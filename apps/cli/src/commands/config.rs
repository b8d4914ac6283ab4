//! Config command implementation.

use super::config_path;
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use loupe_training::ExperimentConfig;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a config file with every default spelled out
    Init {
        /// Target file (defaults to ./loupe.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        /// Config file (defaults to ./loupe.toml, or built-in defaults if absent)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load and validate a config file
    Validate {
        /// Config file to check
        path: PathBuf,
    },
}

pub async fn execute(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { path, force } => init(&config_path(path), force),
        ConfigCommand::Show { config } => show(&config_path(config)),
        ConfigCommand::Validate { path } => validate(&path),
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, ExperimentConfig::default_toml()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{}", format!("✓ Wrote default configuration to {}", path.display()).green().bold());
    Ok(())
}

fn show(path: &Path) -> Result<()> {
    let config = ExperimentConfig::load_or_default(path)?;
    print!("{}", config.to_toml()?);
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let config = ExperimentConfig::load(path).with_context(|| format!("Invalid config {}", path.display()))?;

    println!("{}", format!("✓ {} is valid", path.display()).green().bold());
    println!();
    println!("  Loss floor:     {}", config.stopping.loss_floor.to_string().cyan());
    println!("  Max duration:   {}s", config.stopping.max_duration_secs.to_string().cyan());
    println!("  Evaluate every: {} iterations", config.evaluation.every_iterations.to_string().cyan());
    println!("  Scales:         {}", format!("{:?}", config.evaluation.scales).cyan());
    println!("  Checkpoints:    {}", config.checkpoint.dir.display().to_string().dimmed());
    Ok(())
}
