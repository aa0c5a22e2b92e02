//! Exclusive build lock
//!
//! An advisory OS lock on `.build.lock`, so a crashed process never leaves a
//! stale lock behind. The owner's pid is written into the file for
//! diagnostics only.

use crate::errors::QuantlabError;
use fslock::LockFile;
use std::path::{Path, PathBuf};

/// Held for the whole of a build or clean; released on drop
#[derive(Debug)]
pub struct BuildLock {
    lock: LockFile,
    path: PathBuf,
}

impl BuildLock {
    /// Take the lock without waiting
    pub fn try_acquire(path: &Path) -> Result<Self, QuantlabError> {
        let mut lock = LockFile::open(path)?;
        if !lock.try_lock_with_pid()? {
            let pid = read_owner_pid(path);
            tracing::debug!(path = %path.display(), ?pid, "Build lock is held");
            return Err(QuantlabError::BuildInProgress {
                path: path.to_path_buf(),
                pid,
            });
        }
        tracing::debug!(path = %path.display(), "Acquired build lock");
        Ok(BuildLock {
            lock,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        // The file stays; removing it would let a waiter lock an orphaned inode
        if let Err(e) = self.lock.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release build lock");
        } else {
            tracing::debug!(path = %self.path.display(), "Released build lock");
        }
    }
}

fn read_owner_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse().ok())
}
