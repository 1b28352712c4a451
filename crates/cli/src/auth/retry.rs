// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::flow::AuthFlow;
use super::lock::{ProcessLock, AUTH_FLOW_LOCK};
use super::{Deadline, AUTH_TIMEOUT};
use crate::credential::persist::ConfigManager;
use crate::credential::store::CredentialStore;
use crate::credential::AuthInformation;
use crate::error::Result;
use crate::progress::Progress;

/// Runs a gateway operation with a logged-in store, re-authenticating once
/// when the gateway answers `Unauthenticated`.
///
/// The operation runs at most twice. The second result is returned as is.
#[derive(Clone)]
pub struct RetryWrapper {
    manager: ConfigManager,
    flow: AuthFlow,
    lock: ProcessLock,
    timeout: Duration,
}

impl RetryWrapper {
    pub fn new(manager: ConfigManager, flow: AuthFlow) -> Self {
        Self { manager, flow, lock: ProcessLock::new(AUTH_FLOW_LOCK), timeout: AUTH_TIMEOUT }
    }

    pub fn with_lock(mut self, lock: ProcessLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    /// Run `op`, printing progress unless `silent`.
    pub async fn run<T, F, Fut>(&self, silent: bool, op: F) -> Result<T>
    where
        F: FnMut(Arc<CredentialStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with(&Progress::new(silent), op).await
    }

    pub async fn run_with<T, F, Fut>(&self, progress: &Progress, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<CredentialStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = Deadline::after(self.timeout);
        let store = Arc::new(self.manager.load()?);

        if !store.has_valid_primary() {
            self.authenticate(&store, false, deadline, progress).await?;
        }

        match deadline.operation(op(Arc::clone(&store))).await {
            Err(e) if e.is_unauthenticated() => {
                warn!("gateway rejected the credential, logging in again: {e}");
                self.authenticate(&store, true, deadline, progress).await?;
                deadline.operation(op(store)).await
            }
            other => other,
        }
    }

    /// Log in under the process lock.
    ///
    /// Without `force`, a credential saved by another process while we were
    /// waiting for the lock is picked up instead of opening a browser.
    pub async fn authenticate(
        &self,
        store: &CredentialStore,
        force: bool,
        deadline: Deadline,
        progress: &Progress,
    ) -> Result<AuthInformation> {
        let mut guard = deadline.interactive(self.lock.acquire(progress)).await?;

        if !force {
            self.adopt_saved_primary(store);
        }
        let result = self.flow.run(&self.manager, store, force, deadline, progress).await;

        if let Err(e) = guard.release() {
            warn!("failed to release the login lock: {e}");
        }
        result
    }

    fn adopt_saved_primary(&self, store: &CredentialStore) {
        match self.manager.load() {
            Ok(saved) => {
                if let Some(primary) = saved.primary().filter(AuthInformation::is_valid) {
                    debug!(owner = %primary.owner, "using credential saved by another process");
                    store.set_primary(primary);
                }
            }
            Err(e) => debug!("could not reload config: {e}"),
        }
    }
}

impl std::fmt::Debug for RetryWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryWrapper")
            .field("manager", &self.manager)
            .field("lock", &self.lock)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
