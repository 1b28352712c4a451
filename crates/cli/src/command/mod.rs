// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands: `config`, `auth`, `get`, `version`.

pub mod auth;
pub mod config;
pub mod get;
pub mod version;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::flow::{AuthFlow, BrowserOpener, SystemBrowser};
use crate::auth::lock::{ProcessLock, AUTH_FLOW_LOCK};
use crate::auth::retry::RetryWrapper;
use crate::auth::AUTH_TIMEOUT;
use crate::config::Command;
use crate::credential::persist::ConfigManager;
use crate::credential::secret::KeyringSecretStore;
use crate::error::Result;
use crate::gateway::{Connector, GrpcConnector};

/// Collaborators shared by every subcommand.
#[derive(Clone)]
pub struct Context {
    manager: ConfigManager,
    connector: Arc<dyn Connector>,
    browser: Arc<dyn BrowserOpener>,
    lock: ProcessLock,
    callback_addrs: Option<Vec<String>>,
    auth_timeout: std::time::Duration,
}

impl Context {
    pub fn new(
        manager: ConfigManager,
        connector: Arc<dyn Connector>,
        browser: Arc<dyn BrowserOpener>,
    ) -> Self {
        Self {
            manager,
            connector,
            browser,
            lock: ProcessLock::new(AUTH_FLOW_LOCK),
            callback_addrs: None,
            auth_timeout: AUTH_TIMEOUT,
        }
    }

    /// Keyring secrets, the gRPC gateway and the system browser.
    pub fn system(config_path: PathBuf) -> Self {
        Self::new(
            ConfigManager::new(config_path, Arc::new(KeyringSecretStore::default())),
            Arc::new(GrpcConnector::default()),
            Arc::new(SystemBrowser),
        )
    }

    pub fn with_lock(mut self, lock: ProcessLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_callback_addrs<S: Into<String>>(mut self, addrs: impl IntoIterator<Item = S>) -> Self {
        self.callback_addrs = Some(addrs.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_auth_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn flow(&self) -> AuthFlow {
        let flow = AuthFlow::new(Arc::clone(&self.connector), Arc::clone(&self.browser));
        match &self.callback_addrs {
            Some(addrs) => flow.with_callback_addrs(addrs.iter().cloned()),
            None => flow,
        }
    }

    pub fn retry(&self) -> RetryWrapper {
        RetryWrapper::new(self.manager.clone(), self.flow())
            .with_lock(self.lock.clone())
            .with_timeout(self.auth_timeout)
    }
}

/// Run one subcommand, writing its primary output to `out`.
pub async fn run(ctx: &Context, command: &Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Config(args) => config::run(ctx, args, out),
        Command::Auth(args) => auth::run(ctx, args, out).await,
        Command::Get(args) => get::run(ctx, args, out).await,
        Command::Version => version::run(out),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
