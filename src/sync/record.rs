//! Object records shared by the local and remote manifests.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// One file, either on the local host or in the bucket.
///
/// Two records describe the same object iff both `path` and `checksum`
/// match. A record without a checksum (timestamp strategy) never equals one
/// with a checksum. Records built from a local file also keep the file's
/// own path for reading it back; it takes no part in comparisons.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    path: String,
    checksum: Option<String>,
    local: Option<PathBuf>,
}

/// A set of records describing one location at a point in time.
pub type Manifest = HashSet<ObjectRecord>;

impl ObjectRecord {
    /// Record for a local file with a known content digest.
    pub fn new(path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: Some(checksum.into()),
            local: None,
        }
    }

    /// Record for a local file selected without reading its content.
    pub fn without_checksum(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: None,
            local: None,
        }
    }

    /// Record for a local path on disk.
    ///
    /// Object keys are UTF-8, so a file whose path is not valid UTF-8 cannot
    /// be stored. Such files are skipped with a warning and `None` returned.
    pub fn from_local(path: &Path, checksum: Option<String>) -> Option<Self> {
        let Some(rendered) = path.to_str() else {
            tracing::warn!(
                path = %path.display(),
                "skipping file: path is not valid UTF-8 and cannot become an object key"
            );
            return None;
        };
        Some(Self {
            path: normalize_separators(rendered),
            checksum,
            local: Some(path.to_path_buf()),
        })
    }

    /// Record for a remote object. Keys are prefixed with `/` so they line up
    /// with local absolute paths.
    pub fn from_remote(key: &str, etag: Option<&str>) -> Self {
        Self {
            path: format!("/{}", key.trim_start_matches('/')),
            checksum: etag.map(normalize_etag),
            local: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Object key this record is stored under in the bucket.
    pub fn key(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    /// Local file this record refers to.
    pub fn local_path(&self) -> &Path {
        match &self.local {
            Some(local) => local.as_path(),
            None => Path::new(&self.path),
        }
    }
}

impl PartialEq for ObjectRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.checksum == other.checksum
    }
}

impl Eq for ObjectRecord {}

impl Hash for ObjectRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.checksum.hash(state);
    }
}

impl PartialOrd for ObjectRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| self.checksum.cmp(&other.checksum))
    }
}

/// Render a path with `/` separators regardless of platform.
fn normalize_separators(rendered: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        rendered.to_string()
    } else {
        rendered.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// S3 returns ETags quoted and occasionally with a weak prefix.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .to_ascii_lowercase()
}
