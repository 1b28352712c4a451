// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret storage for bearer tokens. Only non-secret metadata ever reaches
//! the config file.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Keyring service name under which every m8ctl token is stored.
pub const SECRET_SERVICE: &str = "m8/m8ctl";

/// Per-account secret storage.
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when no secret exists for `account`.
    fn get(&self, account: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, account: &str, secret: &str) -> anyhow::Result<()>;
}

/// The platform keyring (macOS Keychain, Windows Credential Manager,
/// Secret Service on Linux).
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(SECRET_SERVICE)
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, account: &str) -> anyhow::Result<Option<String>> {
        let entry = keyring::Entry::new(&self.service, account)?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, account: &str, secret: &str) -> anyhow::Result<()> {
        keyring::Entry::new(&self.service, account)?.set_password(secret)?;
        Ok(())
    }
}

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.lock().is_empty()
    }

    pub fn remove(&self, account: &str) -> Option<String> {
        self.secrets.lock().remove(account)
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, account: &str) -> anyhow::Result<Option<String>> {
        Ok(self.secrets.lock().get(account).cloned())
    }

    fn set(&self, account: &str, secret: &str) -> anyhow::Result<()> {
        self.secrets.lock().insert(account.to_owned(), secret.to_owned());
        Ok(())
    }
}
