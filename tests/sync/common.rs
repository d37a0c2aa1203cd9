#![allow(dead_code)]

// Shared fixtures: scratch trees with controlled modification times

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bucketsync::display::MemoryDisplay;
use bucketsync::fs::MemoryStore;
use bucketsync::sync::{Configuration, SyncEngine};
use tempfile::TempDir;

/// A local tree plus a separate state directory.
pub struct Fixture {
    pub tree: TempDir,
    pub state: TempDir,
    pub store: Arc<MemoryStore>,
    pub display: Arc<MemoryDisplay>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            tree: tempfile::tempdir().unwrap(),
            state: tempfile::tempdir().unwrap(),
            store: Arc::new(MemoryStore::new("backups")),
            display: Arc::new(MemoryDisplay::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.tree.path()
    }

    /// Write a file whose mtime lies an hour in the past.
    pub fn write_old(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.root().join(relative);
        write_with_mtime(&path, content, SystemTime::now() - Duration::from_secs(3600));
        path
    }

    /// Write a file whose mtime lies a minute in the future, so it is newer
    /// than any marker written by the test.
    pub fn write_new(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.root().join(relative);
        write_with_mtime(&path, content, SystemTime::now() + Duration::from_secs(60));
        path
    }

    pub fn configuration(&self) -> Configuration {
        Configuration::new(self.root(), self.store.clone())
            .with_state_dir(self.state.path())
            .with_jobs(2)
    }

    pub fn engine(&self) -> SyncEngine {
        self.engine_with(self.configuration())
    }

    pub fn engine_with(&self, configuration: Configuration) -> SyncEngine {
        SyncEngine::new(configuration, self.display.clone())
    }
}

pub fn write_with_mtime(path: &Path, content: &[u8], mtime: SystemTime) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

/// Object key a local file is stored under.
pub fn key_of(path: &Path) -> String {
    path.to_string_lossy().trim_start_matches('/').to_string()
}
