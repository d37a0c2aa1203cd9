//! Local manifest construction.

use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fs::LocalFs;
use crate::sync::filter::FileFilter;
use crate::sync::hash::hash_file;
use crate::sync::record::{Manifest, ObjectRecord};

/// Builds the checksum manifest of the local tree.
#[derive(Debug, Clone)]
pub struct LocalManifestBuilder {
    root: PathBuf,
    filter: FileFilter,
}

impl LocalManifestBuilder {
    pub fn new(root: impl Into<PathBuf>, filter: FileFilter) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hash every selected regular file under the root.
    ///
    /// Files are hashed in parallel. A file that disappears or cannot be read
    /// between the walk and the hash is skipped with a warning; it is picked
    /// up again by the next run that can read it.
    pub fn build(&self) -> Result<Manifest> {
        let files = LocalFs::walk_files(&self.root, &self.filter)?;
        tracing::info!(root = %self.root.display(), files = files.len(), "hashing local files");

        let manifest = files
            .par_iter()
            .filter_map(|file| match hash_file(&file.path) {
                Ok(checksum) => ObjectRecord::from_local(&file.path, Some(checksum)),
                Err(e) => {
                    tracing::warn!(path = %file.path.display(), error = %e, "failed to hash file");
                    None
                }
            })
            .collect();

        Ok(manifest)
    }

    /// Run [`build`](Self::build) on the blocking pool.
    pub async fn build_async(&self) -> Result<Manifest> {
        let builder = self.clone();
        tokio::task::spawn_blocking(move || builder.build()).await?
    }
}
