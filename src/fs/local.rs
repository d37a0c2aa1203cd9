use chrono::{DateTime, Utc};
use jwalk::WalkDir;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::fs::types::LocalFile;
use crate::sync::filter::FileFilter;

pub struct LocalFs;

impl LocalFs {
    /// Check the sync root exists and is a directory, returning it as a
    /// normalized absolute path. Relative roots resolve against the current
    /// directory.
    pub fn ensure_root(root: &Path) -> Result<PathBuf> {
        if !root.is_dir() {
            return Err(SyncError::PathMissing(root.to_path_buf()));
        }
        let absolute = std::path::absolute(root).map_err(|e| SyncError::io(root, e))?;
        Ok(Self::normalize_path(&absolute))
    }

    /// Walk `root` and return every regular file the filter selects.
    ///
    /// Directories, symlinks and other special files are skipped. Entries
    /// that cannot be read are logged and skipped rather than failing the
    /// walk.
    pub fn walk_files(root: &Path, filter: &FileFilter) -> Result<Vec<LocalFile>> {
        let root = Self::ensure_root(root)?;
        let mut files = Vec::new();

        for entry_result in WalkDir::new(&root)
            .skip_hidden(false) // Hidden files are synced unless filtered
            .follow_links(false) // Don't follow symlinks to avoid loops
            .sort(true)
        {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "error walking directory");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&root).unwrap_or(path.as_path());
            if !filter.is_selected(relative) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot stat file");
                    continue;
                }
            };

            files.push(LocalFile {
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                path,
            });
        }

        Ok(files)
    }

    /// Lexically normalize a path, resolving `.` and `..` without touching
    /// the filesystem.
    pub fn normalize_path(path: &Path) -> PathBuf {
        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::CurDir => {}
                _ => normalized.push(component),
            }
        }

        if normalized.as_os_str().is_empty() {
            normalized.push("/");
        }

        normalized
    }
}
