// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use super::{AuthInformation, ClusterCredentialKey};

/// In-memory view of the operator's credentials for one control plane.
///
/// Shared behind an `Arc` by the login flow, the retry wrapper and the
/// broker's prefetch tasks. The cluster map is guarded by a single mutex so
/// concurrent inserts never lose entries.
#[derive(Debug, Default)]
pub struct CredentialStore {
    server: String,
    primary: RwLock<Option<AuthInformation>>,
    clusters: Mutex<HashMap<ClusterCredentialKey, AuthInformation>>,
}

impl CredentialStore {
    pub fn new(server: impl Into<String>) -> Self {
        Self { server: server.into(), ..Default::default() }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn primary(&self) -> Option<AuthInformation> {
        self.primary.read().clone()
    }

    pub fn set_primary(&self, info: AuthInformation) {
        *self.primary.write() = Some(info);
    }

    /// Owner of the primary credential, or empty when logged out.
    pub fn owner(&self) -> String {
        self.primary.read().as_ref().map(|p| p.owner.clone()).unwrap_or_default()
    }

    /// True when a primary token exists and is outside the soft margin.
    pub fn has_valid_primary(&self) -> bool {
        self.primary.read().as_ref().is_some_and(AuthInformation::is_valid)
    }

    pub fn cluster(&self, key: &ClusterCredentialKey) -> Option<AuthInformation> {
        self.clusters.lock().get(key).cloned()
    }

    pub fn insert_cluster(&self, key: ClusterCredentialKey, info: AuthInformation) {
        self.clusters.lock().insert(key, info);
    }

    /// Snapshot of every cached cluster credential, ordered by key.
    pub fn clusters(&self) -> Vec<(ClusterCredentialKey, AuthInformation)> {
        let mut entries: Vec<_> =
            self.clusters.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.lock().len()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
