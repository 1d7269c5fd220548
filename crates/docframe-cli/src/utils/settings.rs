//! Configuration file selection for commands.

use anyhow::{Context, Result};
use docframe_core::Config;
use std::path::{Path, PathBuf};

/// Path of the configuration file: `--config` when given, the default
/// location otherwise.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path().context("failed to locate configuration file"),
    }
}

/// Effective configuration for a command.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = config_path(explicit)?;
    Config::load_or_default(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}
