// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use crate::command::auth::AuthArgs;
use crate::command::config::ConfigArgs;
use crate::command::get::GetArgs;
use crate::error::{AuthError, Result};

/// Config location relative to the home directory.
pub const DEFAULT_CONFIG_PATH: &str = ".m8/config";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Command-line client for the m8 multi-cluster control plane.
#[derive(Debug, Parser)]
#[command(name = "m8ctl", version = crate::VERSION, about)]
pub struct Cli {
    /// Path to the m8 config file (defaults to ~/.m8/config).
    #[arg(long, global = true, env = "M8CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "M8CTL_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Log format on stderr.
    #[arg(long, global = true, env = "M8CTL_LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or inspect the local config.
    Config(ConfigArgs),
    /// Log in to the control plane.
    Auth(AuthArgs),
    /// Fetch resources from the control plane.
    Get(GetArgs),
    /// Print client version information.
    Version,
}

impl Cli {
    pub fn config_path(&self) -> Result<PathBuf> {
        resolve_config_path(self.config.as_deref())
    }
}

/// Explicit path (with `~` expanded) or `~/.m8/config`.
///
/// `M8CONFIG` arrives through clap as the explicit path.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => expand_home(path),
        None => Ok(home_dir()?.join(DEFAULT_CONFIG_PATH)),
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home_dir(),
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| AuthError::config("cannot determine the home directory"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
