// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential model: the operator's primary token and the per-cluster tokens
//! derived from it.
//!
//! Two expiry predicates exist on purpose. The soft one keeps a five minute
//! margin and decides whether new login work is needed before an operation
//! starts. The exact one keeps a one second margin and decides whether a
//! cached cluster token can be handed out without a gateway call.

pub mod persist;
pub mod secret;
pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Margin kept by [`AuthInformation::is_soft_expired`].
pub const SOFT_EXPIRY_MARGIN_SECS: i64 = 5 * 60;

/// Margin kept by [`AuthInformation::is_exact_expired`].
pub const EXACT_EXPIRY_MARGIN_SECS: i64 = 1;

/// Role for which a cluster token request also warms every other cluster.
pub const DEFAULT_CLUSTER_ROLE: &str = "default";

/// A bearer token together with the principal it was issued to.
///
/// The token itself is never serialized; it lives in the secret store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInformation {
    #[serde(rename = "username", default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(skip)]
    pub token: String,
    /// `None` is the zero value and counts as already expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthInformation {
    pub fn new(
        owner: impl Into<String>,
        token: impl Into<String>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self { owner: owner.into(), token: token.into(), expiry }
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// True when the token expires within [`SOFT_EXPIRY_MARGIN_SECS`] of `now`.
    pub fn is_soft_expired_at(&self, now: DateTime<Utc>) -> bool {
        expires_before(self.expiry, now + TimeDelta::seconds(SOFT_EXPIRY_MARGIN_SECS))
    }

    /// True when the token expires within [`EXACT_EXPIRY_MARGIN_SECS`] of `now`.
    pub fn is_exact_expired_at(&self, now: DateTime<Utc>) -> bool {
        expires_before(self.expiry, now + TimeDelta::seconds(EXACT_EXPIRY_MARGIN_SECS))
    }

    pub fn is_soft_expired(&self) -> bool {
        self.is_soft_expired_at(Utc::now())
    }

    pub fn is_exact_expired(&self) -> bool {
        self.is_exact_expired_at(Utc::now())
    }

    /// Usable for a new operation without logging in first.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.has_token() && !self.is_soft_expired_at(now)
    }

    /// Still literally valid right now.
    pub fn is_valid_exact_at(&self, now: DateTime<Utc>) -> bool {
        self.has_token() && !self.is_exact_expired_at(now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_exact(&self) -> bool {
        self.is_valid_exact_at(Utc::now())
    }
}

fn expires_before(expiry: Option<DateTime<Utc>>, threshold: DateTime<Utc>) -> bool {
    match expiry {
        Some(at) => at < threshold,
        None => true,
    }
}

/// Identifies one cached per-cluster credential.
///
/// Serialized as `<cluster_id>/<owner>/<role>`, which is also the account
/// name used in the secret store. Cluster IDs and roles never contain `/`;
/// owners may.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterCredentialKey {
    pub cluster_id: String,
    pub owner: String,
    pub role: String,
}

impl ClusterCredentialKey {
    pub fn new(
        cluster_id: impl Into<String>,
        owner: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self { cluster_id: cluster_id.into(), owner: owner.into(), role: role.into() }
    }
}

impl fmt::Display for ClusterCredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster_id, self.owner, self.role)
    }
}

impl FromStr for ClusterCredentialKey {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split_once('/')
            .and_then(|(cluster, rest)| rest.rsplit_once('/').map(|(o, r)| (cluster, o, r)));
        match parts {
            Some((cluster, owner, role))
                if !cluster.is_empty() && !owner.is_empty() && !role.is_empty() =>
            {
                Ok(Self::new(cluster, owner, role))
            }
            _ => Err(AuthError::config(format!("malformed cluster credential key: {s:?}"))),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
