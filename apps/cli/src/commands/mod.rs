//! Command implementations for the Loupe CLI.

pub mod config;
pub mod eval_set;
pub mod replay;
pub mod report;

use std::path::PathBuf;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "loupe.toml";

pub fn config_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}
