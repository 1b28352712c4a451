// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Result alias used throughout the authentication subsystem.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failures surfaced by login, credential caching and wrapped gateway calls.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No usable stored configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Gateway unreachable, or no local callback port could be bound.
    #[error("network error: {0}")]
    Network(String),

    /// The browser redirect did not match the login handshake.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The operator did not finish the browser login before the deadline.
    #[error("timed out after {}s waiting for authentication", .0.as_secs())]
    InteractiveTimeout(Duration),

    /// The gateway rejected the presented credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Writing the credential cache to disk or to the secret store failed.
    #[error("failed to persist credentials: {0}")]
    Persist(String),

    /// Any other gateway status, passed through unchanged.
    #[error("gateway error: {}: {}", .0.code(), .0.message())]
    Rpc(tonic::Status),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist(message.into())
    }

    /// Whether this failure should trigger a forced re-authentication.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    /// Remediation hint printed below fatal errors.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("run `m8ctl config init --server-url <URL>` to create a config"),
            Self::Network(_) => Some(
                "check that the control plane is reachable and that localhost ports 8000/18000 are free",
            ),
            Self::Protocol(_) => Some("the login redirect was rejected; run `m8ctl auth login --force`"),
            Self::InteractiveTimeout(_) => {
                Some("complete the login in the browser within two minutes and try again")
            }
            Self::Unauthenticated(_) => Some("run `m8ctl auth login --force` to log in again"),
            Self::Persist(_) => {
                Some("credentials stay valid for this run but will not survive a restart")
            }
            Self::Rpc(_) | Self::Io(_) | Self::Json(_) => None,
        }
    }
}

impl From<tonic::Status> for AuthError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unauthenticated => Self::Unauthenticated(status.message().to_owned()),
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => {
                Self::Network(format!("{}: {}", status.code(), status.message()))
            }
            _ => Self::Rpc(status),
        }
    }
}

impl From<tonic::transport::Error> for AuthError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
