//! Change detection.
//!
//! Two strategies decide which local files need uploading:
//!
//! - **Timestamp**: after a completed run, select files modified strictly
//!   after that run started. Cheap: no file content is read and the bucket
//!   is not consulted.
//! - **Checksum**: with no completed run on record, hash the whole local tree,
//!   list the whole bucket and upload every local record missing from it.
//!   A path present remotely under a different checksum counts as missing.
//!
//! Deletions are never proposed.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fs::LocalFs;
use crate::sync::filter::FileFilter;
use crate::sync::manifest::LocalManifestBuilder;
use crate::sync::record::{Manifest, ObjectRecord};
use crate::sync::remote::RemoteManifestFetcher;
use crate::sync::state::SyncStateTracker;

/// Strategy chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStrategy {
    /// Files modified after `since`.
    Timestamp { since: DateTime<Utc> },
    /// Full local and remote manifest comparison.
    Checksum,
}

impl DiffStrategy {
    /// Pick the strategy from the recorded sync state.
    pub fn select(state: &SyncStateTracker) -> Result<Self> {
        if state.has_prior_successful_sync() {
            if let Some(since) = state.last_completed_at()? {
                return Ok(DiffStrategy::Timestamp { since });
            }
        }
        Ok(DiffStrategy::Checksum)
    }
}

impl fmt::Display for DiffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffStrategy::Timestamp { since } => write!(f, "time based comparison (since {})", since),
            DiffStrategy::Checksum => write!(f, "checksum comparison"),
        }
    }
}

/// Computes the set of records to upload.
pub struct DiffEngine {
    root: PathBuf,
    filter: FileFilter,
    fetcher: RemoteManifestFetcher,
}

impl DiffEngine {
    pub fn new(root: impl Into<PathBuf>, filter: FileFilter, fetcher: RemoteManifestFetcher) -> Self {
        Self {
            root: root.into(),
            filter,
            fetcher,
        }
    }

    /// Run `strategy` and return the records to upload.
    pub async fn compute(&self, strategy: DiffStrategy) -> Result<Vec<ObjectRecord>> {
        match strategy {
            DiffStrategy::Timestamp { since } => {
                let root = self.root.clone();
                let filter = self.filter.clone();
                tokio::task::spawn_blocking(move || modified_since(&root, &filter, since)).await?
            }
            DiffStrategy::Checksum => {
                let local = self.local_manifest().await?;
                let remote = self.remote_manifest().await?;
                Ok(checksum_diff(&local, &remote))
            }
        }
    }

    /// The local manifest on its own, for callers that report progress
    /// between the two manifest phases.
    pub async fn local_manifest(&self) -> Result<Manifest> {
        LocalManifestBuilder::new(&self.root, self.filter.clone())
            .build_async()
            .await
    }

    pub async fn remote_manifest(&self) -> Result<Manifest> {
        self.fetcher.fetch().await
    }
}

/// Regular files under `root` selected by `filter` whose modification time
/// is strictly after `since`.
pub fn modified_since(root: &Path, filter: &FileFilter, since: DateTime<Utc>) -> Result<Vec<ObjectRecord>> {
    let records = LocalFs::walk_files(root, filter)?
        .into_iter()
        .filter(|file| file.modified.is_some_and(|modified| modified > since))
        .filter_map(|file| ObjectRecord::from_local(&file.path, None))
        .collect();
    Ok(records)
}

/// Local records with no identical (path and checksum) remote record,
/// ordered by path.
pub fn checksum_diff(local: &Manifest, remote: &Manifest) -> Vec<ObjectRecord> {
    let mut missing: Vec<ObjectRecord> = local.difference(remote).cloned().collect();
    missing.sort();
    missing
}
