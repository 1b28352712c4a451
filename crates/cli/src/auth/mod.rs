// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser login against the control plane, serialized across processes and
//! retried once when the gateway rejects a token.

pub mod callback;
pub mod flow;
pub mod lock;
pub mod retry;

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AuthError, Result};

/// Budget for one wrapped operation, including browser think-time.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// A single deadline shared by every step of one wrapped operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self { at: Instant::now() + budget, budget }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run an interactive step; elapsing is an [`AuthError::InteractiveTimeout`].
    pub async fn interactive<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::InteractiveTimeout(self.budget)),
        }
    }

    /// Run a gateway operation; elapsing is a [`AuthError::Network`] error.
    pub async fn operation<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::network(format!(
                "operation exceeded its {}s deadline",
                self.budget.as_secs()
            ))),
        }
    }
}
