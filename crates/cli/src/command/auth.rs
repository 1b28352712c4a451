// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `m8ctl auth`: interactive login and status.

use std::io::Write;

use chrono::SecondsFormat;

use super::Context;
use crate::auth::Deadline;
use crate::error::Result;
use crate::progress::Progress;

#[derive(Debug, clap::Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum AuthCommand {
    /// Log in through the browser.
    Login {
        /// Log in even if the stored credential is still valid.
        #[arg(long, short)]
        force: bool,
    },
    /// Show whether a credential is stored and when it expires.
    Status,
}

pub async fn run(ctx: &Context, args: &AuthArgs, out: &mut dyn Write) -> Result<()> {
    match &args.command {
        AuthCommand::Login { force } => login(ctx, *force, out).await,
        AuthCommand::Status => status(ctx, out),
    }
}

async fn login(ctx: &Context, force: bool, out: &mut dyn Write) -> Result<()> {
    let store = ctx.manager().load()?;
    if !force {
        if let Some(primary) = store.primary().filter(|p| p.is_valid()) {
            writeln!(
                out,
                "Already authenticated as {}. Use --force to log in again.",
                primary.owner
            )?;
            return Ok(());
        }
    }

    let retry = ctx.retry();
    let progress = Progress::new(false);
    let deadline = Deadline::after(ctx.auth_timeout);
    retry.authenticate(&store, force, deadline, &progress).await?;
    Ok(())
}

fn status(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let store = ctx.manager().load()?;
    let primary = store.primary().filter(|p| p.has_token());

    writeln!(out, "Authenticated: {}", primary.is_some())?;
    if let Some(primary) = primary {
        let expiry = primary
            .expiry
            .map(|e| e.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "unknown".to_owned());
        writeln!(out, "Server: {}", store.server())?;
        writeln!(out, "User: {}", primary.owner)?;
        writeln!(out, "Token expiry: {expiry}")?;
        writeln!(out, "Token expired: {}", primary.is_soft_expired())?;
    }
    Ok(())
}
