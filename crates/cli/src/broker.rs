// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-cluster credential broker.
//!
//! Hands out cluster-scoped tokens from the cache while they are still
//! exactly valid, otherwise fetches one from the gateway. A miss for the
//! default role also warms the cache for every other cluster the operator
//! can reach, so the next `kubectl` context switch is free.

use std::sync::Arc;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::credential::persist::ConfigManager;
use crate::credential::store::CredentialStore;
use crate::credential::{AuthInformation, ClusterCredentialKey, DEFAULT_CLUSTER_ROLE};
use crate::error::{AuthError, Result};
use crate::gateway::GatewayClient;
use crate::progress::Progress;

pub const EXEC_CREDENTIAL_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";
pub const EXEC_CREDENTIAL_KIND: &str = "ExecCredential";

/// How a default-role miss warms the rest of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Prefetch {
    /// Fan out, wait for every fetch, then persist once.
    #[default]
    Wait,
    /// Persist the requested token now and warm the rest in the background.
    ///
    /// Only for long-lived embedders. A CLI process exits before the
    /// background fetches finish and they are silently dropped.
    Detached,
}

pub struct ClusterCredentialBroker {
    manager: ConfigManager,
    store: Arc<CredentialStore>,
    client: Arc<dyn GatewayClient>,
    progress: Progress,
    prefetch: Prefetch,
}

impl ClusterCredentialBroker {
    pub fn new(
        manager: ConfigManager,
        store: Arc<CredentialStore>,
        client: Arc<dyn GatewayClient>,
        progress: Progress,
    ) -> Self {
        Self { manager, store, client, progress, prefetch: Prefetch::default() }
    }

    pub fn with_prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Token for `cluster_id` and `role`, issued to the primary credential's
    /// owner.
    pub async fn resolve(&self, cluster_id: &str, role: &str) -> Result<AuthInformation> {
        let owner = self.store.owner();
        if owner.is_empty() {
            return Err(AuthError::config("not logged in; run `m8ctl auth login`"));
        }
        let key = ClusterCredentialKey::new(cluster_id, owner.as_str(), role);

        if let Some(cached) = self.store.cluster(&key).filter(AuthInformation::is_valid_exact) {
            debug!(%key, "cluster credential served from cache");
            return Ok(cached);
        }

        let info = fetch(self.client.as_ref(), &self.store, &key).await?;
        info!(%key, "fetched cluster credential");

        if role != DEFAULT_CLUSTER_ROLE {
            self.persist();
            return Ok(info);
        }

        match self.prefetch {
            Prefetch::Wait => {
                let warmed = prefetch_all(
                    Arc::clone(&self.client),
                    Arc::clone(&self.store),
                    owner,
                    role.to_owned(),
                )
                .await;
                debug!(warmed, "prefetched cluster credentials");
                self.persist();
            }
            Prefetch::Detached => {
                self.persist();
                let client = Arc::clone(&self.client);
                let store = Arc::clone(&self.store);
                let manager = self.manager.clone();
                let role = role.to_owned();
                tokio::spawn(async move {
                    let warmed = prefetch_all(client, Arc::clone(&store), owner, role).await;
                    if warmed > 0 {
                        if let Err(e) = manager.save(&store) {
                            warn!("failed to save prefetched credentials: {e}");
                        }
                    }
                });
            }
        }
        Ok(info)
    }

    /// Failures are reported; the token stays usable for this process.
    fn persist(&self) {
        if let Err(e) = self.manager.save(&self.store) {
            warn!("failed to save cluster credentials: {e}");
            self.progress.println(format!("warning: {e}; the credential cache will not survive a restart"));
        }
    }
}

async fn fetch(
    client: &dyn GatewayClient,
    store: &CredentialStore,
    key: &ClusterCredentialKey,
) -> Result<AuthInformation> {
    let token = client.get_auth_token(&key.cluster_id, &key.role).await?;
    let info = AuthInformation::new(key.owner.clone(), token.access_token, token.expiry);
    store.insert_cluster(key.clone(), info.clone());
    Ok(info)
}

/// Fetch `role` tokens for every cluster lacking an exactly valid one.
///
/// Best effort: listing and per-cluster failures are logged and skipped.
/// Returns how many tokens were stored.
async fn prefetch_all(
    client: Arc<dyn GatewayClient>,
    store: Arc<CredentialStore>,
    owner: String,
    role: String,
) -> usize {
    let clusters = match client.list_clusters().await {
        Ok(c) => c,
        Err(e) => {
            debug!("cannot list clusters for prefetch: {e}");
            return 0;
        }
    };

    let mut tasks = JoinSet::new();
    for cluster in clusters {
        let key = ClusterCredentialKey::new(cluster.id, owner.as_str(), role.as_str());
        if store.cluster(&key).is_some_and(|c| c.is_valid_exact()) {
            continue;
        }
        let client = Arc::clone(&client);
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            let result = fetch(client.as_ref(), &store, &key).await;
            (key, result)
        });
    }

    let mut warmed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(_))) => warmed += 1,
            Ok((key, Err(e))) => debug!(%key, "prefetch failed: {e}"),
            Err(e) => debug!("prefetch task failed: {e}"),
        }
    }
    warmed
}

/// Kubernetes client-go exec plugin response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredential {
    pub api_version: String,
    pub kind: String,
    pub status: ExecCredentialStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredentialStatus {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<String>,
}

impl ExecCredential {
    pub fn new(info: &AuthInformation) -> Self {
        Self {
            api_version: EXEC_CREDENTIAL_API_VERSION.to_owned(),
            kind: EXEC_CREDENTIAL_KIND.to_owned(),
            status: ExecCredentialStatus {
                token: info.token.clone(),
                expiration_timestamp: info
                    .expiry
                    .map(|e| e.to_rfc3339_opts(SecondsFormat::Secs, true)),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
