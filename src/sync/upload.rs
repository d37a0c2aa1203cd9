//! Pushing selected records to the bucket.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::display::DisplaySink;
use crate::fs::ObjectStore;
use crate::sync::record::ObjectRecord;

/// A record that could not be uploaded.
#[derive(Debug, Clone)]
pub struct FailedUpload {
    pub path: String,
    pub error: String,
}

/// Outcome of an upload phase. Failures never abort the phase.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<FailedUpload>,
    pub bytes: u64,
}

impl UploadReport {
    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uploads records with bounded concurrency and per-file failure isolation.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    display: Arc<dyn DisplaySink>,
    jobs: usize,
}

impl Uploader {
    /// `jobs` is the number of uploads in flight; `1` uploads strictly in
    /// order. Zero is treated as one.
    pub fn new(store: Arc<dyn ObjectStore>, display: Arc<dyn DisplaySink>, jobs: usize) -> Self {
        Self {
            store,
            display,
            jobs: jobs.max(1),
        }
    }

    /// Upload every record. Returns once every upload has either finished or
    /// failed.
    pub async fn upload_all(&self, records: Vec<ObjectRecord>) -> UploadReport {
        let results: Vec<_> = stream::iter(records)
            .map(|record| async move {
                let result = self.push(&record).await;
                (record, result)
            })
            .buffer_unordered(self.jobs)
            .collect()
            .await;

        let mut report = UploadReport::default();
        for (record, result) in results {
            match result {
                Ok(bytes) => {
                    report.bytes += bytes;
                    report.uploaded.push(record.path().to_string());
                }
                Err(error) => report.failed.push(FailedUpload {
                    path: record.path().to_string(),
                    error,
                }),
            }
        }
        report
    }

    /// Upload one record, converting any failure into a display line.
    pub async fn push(&self, record: &ObjectRecord) -> std::result::Result<u64, String> {
        self.display.display(&format!("Pushing {}...", record.path()));

        match self.store.put_object(record.key(), record.local_path()).await {
            Ok(bytes) => {
                tracing::debug!(
                    path = record.path(),
                    dest = %self.store.display_key(record.key()),
                    bytes,
                    "uploaded"
                );
                Ok(bytes)
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.display
                    .display(&format!("ERROR: Could not push '{}': {}", record.path(), error));
                Err(error)
            }
        }
    }
}
