// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user advisory lock serializing interactive logins.
//!
//! Several m8ctl processes may hit an expired token at once (kubectl runs
//! the credential plugin per request). Only one of them should open a
//! browser; the others wait here and then pick up the freshly saved token.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::progress::Progress;

/// Lock guarding the browser login.
pub const AUTH_FLOW_LOCK: &str = "m8ctl-auth-flow";

/// How long to wait before telling the user someone else holds the lock.
pub const DETECTION_WINDOW: Duration = Duration::from_millis(500);

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

pub const CONTENDED_NOTICE: &str =
    "Another m8ctl instance is already running the authentication flow. Waiting for it to finish...";

/// A named lock backed by `flock(2)` on `<dir>/<name>.lock`.
#[derive(Debug, Clone)]
pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    /// Lock file in [`default_lock_dir`].
    pub fn new(name: &str) -> Self {
        Self::in_dir(default_lock_dir(), name)
    }

    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Self {
        Self { path: dir.as_ref().join(format!("{name}.lock")) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One non-blocking attempt. `Ok(None)` when another holder has it.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>> {
        let file = open_lock_file(&self.path)?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Some(LockGuard { lock: Some(lock), path: self.path.clone() })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(AuthError::Io(errno.into())),
        }
    }

    /// Block until the lock is ours.
    ///
    /// Retries with exponential backoff. Once [`DETECTION_WINDOW`] has passed
    /// without success, prints [`CONTENDED_NOTICE`] once and keeps waiting.
    /// Bounded only by the caller dropping the future.
    pub async fn acquire(&self, progress: &Progress) -> Result<LockGuard> {
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut notified = false;
        loop {
            if let Some(guard) = self.try_acquire()? {
                debug!(path = %self.path.display(), waited_ms = started.elapsed().as_millis(), "acquired lock");
                return Ok(guard);
            }
            if !notified && started.elapsed() >= DETECTION_WINDOW {
                warn!(path = %self.path.display(), "lock held by another process");
                progress.println(CONTENDED_NOTICE);
                notified = true;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

/// The user's runtime dir (`$XDG_RUNTIME_DIR`), else their cache dir, else
/// the system temp dir.
pub fn default_lock_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .map(|d| d.join("m8ctl"))
        .unwrap_or_else(std::env::temp_dir)
}

/// Opens an existing lock file read-only; `flock(2)` needs no write access.
fn open_lock_file(path: &Path) -> std::io::Result<File> {
    match File::open(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).truncate(false).write(true).open(path)
        }
        other => other,
    }
}

/// Held lock. Released by [`LockGuard::release`] or on drop.
pub struct LockGuard {
    lock: Option<Flock<File>>,
    path: PathBuf,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("path", &self.path).field("held", &self.is_held()).finish()
    }
}

impl LockGuard {
    /// Release now. Calling it again is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if let Some(lock) = self.lock.take() {
            lock.unlock().map_err(|(_, errno)| AuthError::Io(errno.into()))?;
            debug!(path = %self.path.display(), "released lock");
        }
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_some()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(path = %self.path.display(), "failed to release lock: {e}");
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
