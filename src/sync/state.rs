//! Sync run checkpointing.
//!
//! Two sentinel files record when the last run started and when the last
//! run that got through its upload phase started. The completion marker is
//! only ever a copy of a start marker, so its timestamp is the cutoff for the
//! next timestamp-based diff: anything modified while that run was uploading
//! is picked up again next time.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

pub const STARTED_MARKER: &str = ".bucketsync.last-sync.started";
pub const COMPLETED_MARKER: &str = ".bucketsync.last-sync.completed";

/// Tracks start and completion markers in a state directory.
#[derive(Debug, Clone)]
pub struct SyncStateTracker {
    started: PathBuf,
    completed: PathBuf,
}

impl SyncStateTracker {
    /// Tracker using the standard marker names inside `state_dir`.
    pub fn new(state_dir: &Path) -> Self {
        Self::with_paths(state_dir.join(STARTED_MARKER), state_dir.join(COMPLETED_MARKER))
    }

    pub fn with_paths(started: impl Into<PathBuf>, completed: impl Into<PathBuf>) -> Self {
        Self {
            started: started.into(),
            completed: completed.into(),
        }
    }

    pub fn started_path(&self) -> &Path {
        &self.started
    }

    pub fn completed_path(&self) -> &Path {
        &self.completed
    }

    /// Create or overwrite the start marker with the current time.
    pub fn record_start(&self) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        if let Some(parent) = self.started.parent() {
            fs::create_dir_all(parent).map_err(|e| marker_error(parent, e))?;
        }
        write_atomic(&self.started, &now.to_rfc3339_opts(SecondsFormat::Nanos, true))?;
        tracing::debug!(at = %now, "sync start recorded");
        Ok(now)
    }

    /// Copy the start marker's timestamp into the completion marker.
    pub fn record_completion(&self) -> Result<DateTime<Utc>> {
        let started_at = read_marker(&self.started)?
            .ok_or_else(|| marker_error(&self.started, ErrorKind::NotFound.into()))?;
        write_atomic(
            &self.completed,
            &started_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        )?;
        tracing::debug!(at = %started_at, "sync completion recorded");
        Ok(started_at)
    }

    /// Whether a completion marker exists, regardless of the start marker.
    pub fn has_prior_successful_sync(&self) -> bool {
        self.completed.is_file()
    }

    /// Timestamp of the last started run, if any.
    pub fn last_started_at(&self) -> Result<Option<DateTime<Utc>>> {
        read_marker(&self.started)
    }

    /// Cutoff for the timestamp strategy: start time of the last completed run.
    pub fn last_completed_at(&self) -> Result<Option<DateTime<Utc>>> {
        read_marker(&self.completed)
    }

    /// A start marker newer than the completion marker means the previous
    /// run never finished.
    pub fn has_unfinished_run(&self) -> Result<bool> {
        Ok(match (self.last_started_at()?, self.last_completed_at()?) {
            (Some(started), Some(completed)) => started > completed,
            (Some(_), None) => true,
            _ => false,
        })
    }
}

/// Read a marker's timestamp. Markers written by other tools may be empty;
/// their modification time stands in for the content.
fn read_marker(path: &Path) -> Result<Option<DateTime<Utc>>> {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(marker_error(path, e)),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(body.trim()) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| marker_error(path, e))?;
    Ok(Some(DateTime::<Utc>::from(modified)))
}

fn write_atomic(path: &Path, body: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", std::process::id()));
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).map_err(|e| marker_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| marker_error(path, e))
}

fn marker_error(path: &Path, source: std::io::Error) -> SyncError {
    SyncError::StateMarker {
        path: path.to_path_buf(),
        source,
    }
}
