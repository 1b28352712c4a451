// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `m8ctl config`: create and inspect the local config file.

use std::io::Write;

use tracing::info;

use super::Context;
use crate::error::Result;

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum ConfigCommand {
    /// Create a new config pointing at a control plane.
    Init {
        /// URL of the m8 control plane.
        #[arg(long, short = 'u')]
        server_url: String,
        /// Overwrite an existing config.
        #[arg(long, short)]
        force: bool,
    },
    /// Print the config location and contents (tokens are never stored there).
    View,
}

pub fn run(ctx: &Context, args: &ConfigArgs, out: &mut dyn Write) -> Result<()> {
    let manager = ctx.manager();
    match &args.command {
        ConfigCommand::Init { server_url, force } => {
            manager.init(server_url, *force)?;
            info!(path = %manager.path().display(), server = %server_url, "config initialised");
            writeln!(out, "Config written to {}.", manager.path().display())?;
        }
        ConfigCommand::View => {
            let file = manager.read_file()?;
            writeln!(out, "{}:", manager.path().display())?;
            writeln!(out, "{}", serde_json::to_string_pretty(&file)?)?;
        }
    }
    Ok(())
}
