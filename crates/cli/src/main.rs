// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use clap::Parser;
use tracing::debug;

use m8ctl::command::{self, Context};
use m8ctl::config::{Cli, LogFormat};
use m8ctl::error::AuthError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        if let Some(hint) = e.hint() {
            eprintln!("hint: {hint}");
        }
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(cli: Cli) -> Result<(), AuthError> {
    let path = cli.config_path()?;
    debug!(path = %path.display(), "using config");

    let ctx = Context::system(path);
    let mut stdout = std::io::stdout().lock();
    command::run(&ctx, &cli.command, &mut stdout).await?;
    stdout.flush()?;
    Ok(())
}
