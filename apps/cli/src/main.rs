//! Loupe CLI - tooling around supervised fine-tuning experiments
//!
//! The `loupe` binary manages experiment configuration, builds the fixed
//! evaluation set, dry-runs the per-event policies against recorded progress
//! logs and reads back finished experiment manifests.

mod commands;

use clap::{Parser, Subcommand};
use commands::{config, eval_set, replay, report};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Loupe - supervise adapter fine-tuning experiments
#[derive(Parser, Debug)]
#[command(name = "loupe", author, version, about = "Loupe - supervise adapter fine-tuning experiments")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, inspect and validate experiment configuration files
    Config {
        #[command(subcommand)]
        command: config::ConfigCommand,
    },

    /// Build the fixed evaluation set from a JSONL dataset
    ///
    /// Shuffles the dataset with a seeded generator, keeps the first
    /// `--max-samples` rows and writes them to `--out`.
    EvalSet {
        /// JSONL file of `{"input": ..., "expected_label": ...}` rows
        dataset: PathBuf,

        /// Where to write the evaluation set
        #[arg(long)]
        out: PathBuf,

        /// Config file supplying the sample cap and seed (defaults to loupe.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of samples to keep (defaults to the configured value)
        #[arg(long)]
        max_samples: Option<usize>,

        /// Shuffle seed (defaults to the configured value)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Replay a recorded progress log through the experiment policies
    ///
    /// Prints what the controller would do for every event: stop, snapshot,
    /// sweep or save a recovery checkpoint.
    Replay {
        /// JSONL file of progress events
        events: PathBuf,

        /// Experiment config (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the manifest of a finished experiment
    Report {
        /// Experiment directory
        dir: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `--json` output stays parseable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Config { command } => config::execute(command).await,
        Command::EvalSet { dataset, out, config, max_samples, seed } => {
            eval_set::execute(dataset, out, config, max_samples, seed).await
        }
        Command::Replay { events, config, json } => replay::execute(events, config, json).await,
        Command::Report { dir, json } => report::execute(dir, json).await,
    }
}
