//! Single-instance execution guard.
//!
//! The lock is a marker file at a well-known path. It is created with
//! `create_new`, so two runs racing for it cannot both win, and it is removed
//! when the returned [`LockGuard`] is dropped. The marker holds a small JSON
//! record naming the owning process so a lock left behind by a crashed run
//! can be recognised. Such locks are reported, never removed automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Identity of the run holding the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    /// Whether the owning process is known to be gone.
    ///
    /// Only answerable where `/proc` exists; elsewhere a lock is never
    /// considered stale.
    pub fn is_stale(&self) -> bool {
        let proc_root = Path::new("/proc");
        proc_root.is_dir() && !proc_root.join(self.pid.to_string()).exists()
    }
}

/// Manages the lock marker at a fixed path.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, failing with [`SyncError::LockHeld`] if any marker
    /// already exists.
    pub fn acquire(&self) -> Result<LockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = self.holder();
                let stale = holder.as_ref().is_some_and(LockRecord::is_stale);
                return Err(SyncError::LockHeld {
                    path: self.path.clone(),
                    holder,
                    stale,
                });
            }
            Err(e) => return Err(SyncError::io(&self.path, e)),
        };

        // The guard exists before the record is written so a failed write
        // still removes the marker.
        let guard = LockGuard {
            path: self.path.clone(),
            record: LockRecord::current(),
        };
        let body = serde_json::to_vec(&guard.record)?;
        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .map_err(|e| SyncError::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), pid = guard.record.pid, "lock acquired");
        Ok(guard)
    }

    /// Run `f` while holding the lock. The lock is released whether `f`
    /// succeeds or fails.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.acquire()?;
        f()
    }

    /// Read the record of the current holder, if the marker exists and is
    /// readable. Markers from older runs may be empty.
    pub fn holder(&self) -> Option<LockRecord> {
        let body = fs::read(&self.path).ok()?;
        serde_json::from_slice(&body).ok()
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Remove the marker regardless of who owns it. Returns whether a marker
    /// was present.
    pub fn force_release(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::io(&self.path, e)),
        }
    }
}

/// Scoped lock ownership; dropping it deletes the marker.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    record: LockRecord,
}

impl LockGuard {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        } else {
            tracing::debug!(path = %self.path.display(), "lock released");
        }
    }
}
