//! Error types for bucketsync

use std::path::PathBuf;

use thiserror::Error;

use crate::sync::lock::LockRecord;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Fatal errors that abort a sync run.
///
/// Per-file upload failures are not represented here: they are recorded in
/// [`crate::sync::UploadReport`] and the run carries on.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Found a lock at {}, is another instance of bucketsync running?{}", path.display(), stale_hint(*stale))]
    LockHeld {
        path: PathBuf,
        holder: Option<LockRecord>,
        stale: bool,
    },

    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("Local path {} does not exist", .0.display())]
    PathMissing(PathBuf),

    #[error("Failed to list remote objects (marker: {}): {source:#}", marker.as_deref().unwrap_or("<start>"))]
    RemoteListing {
        marker: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Sync state marker {} unusable: {source}", path.display())]
    StateMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Interrupted, sync state left unfinished")]
    Interrupted,
}

fn stale_hint(stale: bool) -> &'static str {
    if stale {
        " (the owning process is gone, run `bucketsync unlock` if no sync is running)"
    } else {
        ""
    }
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the error was caused by a concurrent or crashed run.
    pub fn is_lock_held(&self) -> bool {
        matches!(self, SyncError::LockHeld { .. })
    }
}
