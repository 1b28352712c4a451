// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk config file and the secret store behind it.
//!
//! The file holds the server URL and token metadata (owner, expiry). Tokens
//! themselves go to the [`SecretStore`]: the primary one under the owner's
//! name, cluster ones under their `<cluster>/<owner>/<role>` key.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::secret::SecretStore;
use super::store::CredentialStore;
use super::{AuthInformation, ClusterCredentialKey};
use crate::error::{AuthError, Result};

/// Serialized shape of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_information: Option<AuthInformation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_auth_information: BTreeMap<String, AuthInformation>,
}

impl ConfigFile {
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(AuthError::config("config has no server defined"));
        }
        Ok(())
    }
}

/// Loads and saves a [`CredentialStore`] at a fixed path.
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    secrets: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager").field("path", &self.path).finish_non_exhaustive()
    }
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { path: path.into(), secrets }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write a fresh config for `server`. Refuses to clobber an existing file
    /// unless `force` is set.
    pub fn init(&self, server: &str, force: bool) -> Result<()> {
        if self.exists() && !force {
            return Err(AuthError::config(format!(
                "a config already exists at {}; pass --force to overwrite",
                self.path.display()
            )));
        }
        let file = ConfigFile { server: server.to_owned(), ..Default::default() };
        file.validate()?;
        self.write_file(&file)
    }

    /// Parse the config file without touching the secret store.
    pub fn read_file(&self) -> Result<ConfigFile> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::config(format!(
                    "no valid m8 config found at {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let file: ConfigFile = serde_json::from_str(&data).map_err(|e| {
            AuthError::config(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        file.validate()?;
        Ok(file)
    }

    /// Load the config and fill in tokens from the secret store.
    ///
    /// A primary entry whose secret is missing is kept without a token, so
    /// the next operation logs in again. Cluster entries whose secret is
    /// missing are dropped.
    pub fn load(&self) -> Result<CredentialStore> {
        let file = self.read_file()?;
        let store = CredentialStore::new(file.server);

        if let Some(mut primary) = file.auth_information {
            if !primary.owner.is_empty() {
                match self.secrets.get(&primary.owner) {
                    Ok(Some(token)) => primary.token = token,
                    Ok(None) => debug!(owner = %primary.owner, "no stored primary token"),
                    Err(e) => warn!(owner = %primary.owner, "failed to read primary token: {e}"),
                }
            }
            store.set_primary(primary);
        }

        for (raw_key, mut info) in file.cluster_auth_information {
            let key: ClusterCredentialKey = match raw_key.parse() {
                Ok(k) => k,
                Err(e) => {
                    debug!("skipping cluster credential: {e}");
                    continue;
                }
            };
            match self.secrets.get(&raw_key) {
                Ok(Some(token)) => {
                    info.token = token;
                    store.insert_cluster(key, info);
                }
                Ok(None) => debug!(key = %raw_key, "dropping cluster credential without secret"),
                Err(e) => debug!(key = %raw_key, "dropping cluster credential: {e}"),
            }
        }

        Ok(store)
    }

    /// Persist `store`: secrets first, then the metadata file.
    pub fn save(&self, store: &CredentialStore) -> Result<()> {
        let mut file = ConfigFile { server: store.server().to_owned(), ..Default::default() };

        if let Some(primary) = store.primary() {
            if primary.has_token() && !primary.owner.is_empty() {
                self.secrets
                    .set(&primary.owner, &primary.token)
                    .map_err(|e| AuthError::persist(format!("primary token: {e}")))?;
            }
            file.auth_information = Some(primary);
        }

        for (key, info) in store.clusters() {
            let account = key.to_string();
            if info.has_token() {
                self.secrets
                    .set(&account, &info.token)
                    .map_err(|e| AuthError::persist(format!("{account}: {e}")))?;
            }
            file.cluster_auth_information.insert(account, info);
        }

        self.write_file(&file)
    }

    /// Atomic write under an exclusive lock on `<path>.lock`.
    fn write_file(&self, file: &ConfigFile) -> Result<()> {
        let json = serde_json::to_string_pretty(file)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AuthError::persist(format!("{}: {e}", parent.display())))?;
            }
        }

        let _lock = lock_exclusive(&lock_path(&self.path))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| AuthError::persist(format!("{}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| AuthError::persist(format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), clusters = file.cluster_auth_information.len(), "saved config");
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn lock_exclusive(path: &Path) -> Result<Flock<File>> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| AuthError::persist(format!("{}: {e}", path.display())))?;
    Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| AuthError::persist(format!("{}: {errno}", path.display())))
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
