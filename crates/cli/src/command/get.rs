// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `m8ctl get`: read resources from the control plane.
//!
//! `get cluster-credentials` doubles as a `kubectl` exec-credential plugin,
//! so stdout carries exactly one JSON document and nothing else.

use std::io::Write;
use std::sync::Arc;

use super::Context;
use crate::broker::{ClusterCredentialBroker, ExecCredential, Prefetch};
use crate::error::Result;
use crate::progress::Progress;

#[derive(Debug, clap::Args)]
pub struct GetArgs {
    #[command(subcommand)]
    pub command: GetCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum GetCommand {
    /// Print an ExecCredential for a cluster and role.
    ClusterCredentials {
        /// Cluster ID.
        cluster_id: String,
        /// Cluster role, e.g. `default` or `admin`.
        role: String,
    },
}

pub async fn run(ctx: &Context, args: &GetArgs, out: &mut dyn Write) -> Result<()> {
    match &args.command {
        GetCommand::ClusterCredentials { cluster_id, role } => {
            cluster_credentials(ctx, cluster_id, role, out).await
        }
    }
}

async fn cluster_credentials(
    ctx: &Context,
    cluster_id: &str,
    role: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let manager = ctx.manager().clone();
    let connector = Arc::clone(ctx.connector());

    let info = ctx
        .retry()
        .run(true, |store| {
            let manager = manager.clone();
            let connector = Arc::clone(&connector);
            async move {
                let token = store.primary().map(|p| p.token).unwrap_or_default();
                let client = connector.connect(store.server(), Some(&token)).await?;
                ClusterCredentialBroker::new(manager, store, client, Progress::new(true))
                    .with_prefetch(Prefetch::Wait)
                    .resolve(cluster_id, role)
                    .await
            }
        })
        .await?;

    writeln!(out, "{}", ExecCredential::new(&info).to_json()?)?;
    Ok(())
}
