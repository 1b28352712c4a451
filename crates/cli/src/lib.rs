// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod auth;
pub mod broker;
pub mod command;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod progress;
#[cfg(test)]
pub mod test_support;

/// Client version, derived from git tags at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short commit hash the client was built from.
pub const COMMIT: &str = env!("M8CTL_COMMIT");
