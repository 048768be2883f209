//! Per-destination advisory file lock.
//!
//! A sentinel file at `<destination>.lock` serializes download work on one
//! destination across threads *and* independent processes: presence means
//! held, creation uses exclusive-create semantics, and release removes the
//! file. Contention is handled by bounded fixed-delay retries.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::errors::DownloadError;

/// Held advisory lock. Removing the sentinel on drop covers every exit path.
#[derive(Debug)]
pub struct PathLock {
    path: PathBuf,
}

impl PathLock {
    /// Acquire the lock at `path`, retrying on contention.
    ///
    /// Fails with [`DownloadError::LockBusy`] once `retries` attempts spaced
    /// `delay` apart are exhausted.
    pub async fn acquire(
        path: PathBuf,
        retries: u32,
        delay: Duration,
    ) -> Result<Self, DownloadError> {
        for attempt in 0..retries {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt + 1 < retries {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DownloadError::LockBusy { path })
    }

    /// The sentinel path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
