//! Opt-in record of uploads that failed, so the timestamp strategy can retry
//! them on the next run instead of losing them behind the completion cutoff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::sync::record::ObjectRecord;
use crate::sync::upload::UploadReport;

pub const LEDGER_FILE: &str = ".bucketsync.failed.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDoc {
    updated_at: Option<DateTime<Utc>>,
    paths: BTreeSet<String>,
}

/// Failure ledger stored as JSON in the state directory.
#[derive(Debug, Clone)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(LEDGER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Paths that failed in the previous run. A missing ledger is empty.
    pub fn load(&self) -> Result<BTreeSet<String>> {
        match fs::read(&self.path) {
            Ok(body) => {
                let doc: LedgerDoc = serde_json::from_slice(&body)?;
                Ok(doc.paths)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(SyncError::io(&self.path, e)),
        }
    }

    /// Replace the ledger with the failures of `report`. A clean report
    /// removes the ledger.
    pub fn store(&self, report: &UploadReport) -> Result<()> {
        if report.is_clean() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SyncError::io(&self.path, e)),
            };
        }

        let doc = LedgerDoc {
            updated_at: Some(Utc::now()),
            paths: report.failed.iter().map(|f| f.path.clone()).collect(),
        };
        let body = serde_json::to_vec_pretty(&doc)?;
        fs::write(&self.path, body).map_err(|e| SyncError::io(&self.path, e))
    }

    /// Add ledger entries that still exist locally to `records`, skipping
    /// paths already selected.
    pub fn merge_into(&self, records: &mut Vec<ObjectRecord>) -> Result<usize> {
        let selected: BTreeSet<String> = records.iter().map(|r| r.path().to_string()).collect();
        let mut added = 0;
        for path in self.load()? {
            if selected.contains(&path) || !Path::new(&path).is_file() {
                continue;
            }
            records.push(ObjectRecord::without_checksum(path));
            added += 1;
        }
        Ok(added)
    }
}
