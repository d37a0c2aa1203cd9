use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// One entry of a bucket listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub etag: Option<String>,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, etag: Option<String>) -> Self {
        Self {
            key: key.into(),
            etag,
        }
    }
}

/// A regular file found under the sync root.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}
