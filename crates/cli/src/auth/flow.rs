// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::callback::{CallbackListener, ResultPage, DEFAULT_CALLBACK_ADDRS};
use super::Deadline;
use crate::credential::persist::ConfigManager;
use crate::credential::store::CredentialStore;
use crate::credential::AuthInformation;
use crate::error::{AuthError, Result};
use crate::gateway::Connector;
use crate::progress::{boxed, Progress};

/// Opens URLs in the operator's browser.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// The platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        open::that_detached(url)?;
        Ok(())
    }
}

/// Interactive browser login producing the primary credential.
#[derive(Clone)]
pub struct AuthFlow {
    connector: Arc<dyn Connector>,
    browser: Arc<dyn BrowserOpener>,
    callback_addrs: Vec<String>,
}

impl AuthFlow {
    pub fn new(connector: Arc<dyn Connector>, browser: Arc<dyn BrowserOpener>) -> Self {
        Self {
            connector,
            browser,
            callback_addrs: DEFAULT_CALLBACK_ADDRS.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    /// Override the callback listener's candidate addresses.
    pub fn with_callback_addrs<S: Into<String>>(mut self, addrs: impl IntoIterator<Item = S>) -> Self {
        self.callback_addrs = addrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Return the store's primary credential, logging in first when it is
    /// missing, soft-expired, or `force` is set.
    ///
    /// A fresh credential is written to `store` and saved through `manager`;
    /// a failed save is reported but the credential is still returned.
    pub async fn run(
        &self,
        manager: &ConfigManager,
        store: &CredentialStore,
        force: bool,
        deadline: Deadline,
        progress: &Progress,
    ) -> Result<AuthInformation> {
        if !force {
            if let Some(existing) = store.primary().filter(AuthInformation::is_valid) {
                debug!(owner = %existing.owner, "primary credential still valid");
                return Ok(existing);
            }
        }

        let info = deadline.interactive(self.login(store.server(), progress)).await;
        progress.finish();
        let info = info?;

        store.set_primary(info.clone());
        if let Err(e) = manager.save(store) {
            warn!("failed to save credentials: {e}");
            progress.println(format!("warning: {e}; you will need to log in again next time"));
        }
        info!(owner = %info.owner, "authenticated");
        progress.println(format!("Successfully authenticated as {}.", info.owner));
        Ok(info)
    }

    async fn login(&self, server: &str, progress: &Progress) -> Result<AuthInformation> {
        let client = self.connector.connect(server, None).await?;
        let listener =
            CallbackListener::bind(&self.callback_addrs, ResultPage::new(server)).await?;
        let redirect_uri = listener.redirect_uri();
        let upstream = client.request_upstream_authentication(&redirect_uri).await?;
        listener.expect_state(&upstream.state);
        debug!(%redirect_uri, "waiting for login callback");

        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let receive = async move {
            let _ = ready_tx.send(());
            listener.receive().await
        };
        let open_browser = async {
            ready_rx
                .await
                .map_err(|_| AuthError::protocol("callback listener stopped before it was ready"))?;
            if let Err(e) = self.browser.open(&upstream.redirect_url) {
                warn!("failed to open browser: {e}");
                progress.println(format!("Could not open a browser automatically: {e}"));
            }
            progress.println(boxed(&[
                "Your browser has been opened to visit:",
                "",
                &upstream.redirect_url,
                "",
                "If it did not open, copy the URL into a browser on this machine.",
            ]));
            progress.wait("Waiting for the login to complete in the browser...");
            Ok::<_, AuthError>(())
        };

        let ((), callback) = tokio::try_join!(open_browser, receive)?;
        let user = client.request_authentication(&callback.code, &callback.state).await?;
        Ok(AuthInformation::new(user.username, user.access_token, user.expiry))
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
