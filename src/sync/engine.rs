//! Sync engine for one-way local → bucket synchronization.
//!
//! Ties the pieces together: the lock wraps the whole run, the recorded sync
//! state picks the diff strategy, the diff output is pushed by the uploader
//! and the completion marker is written once every upload has returned.

use humansize::{format_size, DECIMAL};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::display::DisplaySink;
use crate::error::{Result, SyncError};
use crate::fs::{LocalFs, ObjectStore};
use crate::sync::diff::{checksum_diff, DiffEngine, DiffStrategy};
use crate::sync::filter::FileFilter;
use crate::sync::ledger::FailureLedger;
use crate::sync::lock::LockManager;
use crate::sync::record::ObjectRecord;
use crate::sync::remote::{RemoteManifestFetcher, DEFAULT_PAGE_SIZE};
use crate::sync::state::SyncStateTracker;
use crate::sync::upload::{UploadReport, Uploader};

/// File name of the lock marker inside the state directory.
pub const LOCK_FILE: &str = ".bucketsync.lock";

/// Fully resolved input of a sync run.
#[derive(Clone)]
pub struct Configuration {
    local_root: PathBuf,
    filter: Option<String>,
    store: Arc<dyn ObjectStore>,
    state_dir: PathBuf,
    jobs: usize,
    page_size: usize,
    failure_ledger: bool,
    dry_run: bool,
}

impl Configuration {
    /// Markers default to the home directory.
    pub fn new(local_root: impl Into<PathBuf>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            local_root: local_root.into(),
            filter: None,
            store,
            state_dir: dirs::home_dir().unwrap_or_else(std::env::temp_dir),
            jobs: 1,
            page_size: DEFAULT_PAGE_SIZE,
            failure_ledger: false,
            dry_run: false,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_failure_ledger(mut self, enabled: bool) -> Self {
        self.failure_ledger = enabled;
        self
    }

    /// Compute and report the diff without uploading or touching markers.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("local_root", &self.local_root)
            .field("filter", &self.filter)
            .field("bucket", &self.store.bucket())
            .field("state_dir", &self.state_dir)
            .field("jobs", &self.jobs)
            .field("page_size", &self.page_size)
            .field("failure_ledger", &self.failure_ledger)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Result of a sync run.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Strategy used to select files.
    pub strategy: DiffStrategy,
    /// Records selected for upload, in emission order.
    pub selected: Vec<ObjectRecord>,
    /// Upload results; empty for dry runs.
    pub report: UploadReport,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Orchestrates a sync run.
pub struct SyncEngine {
    config: Configuration,
    display: Arc<dyn DisplaySink>,
    lock: LockManager,
    state: SyncStateTracker,
    ledger: Option<FailureLedger>,
}

impl SyncEngine {
    /// Create an engine with markers and lock in the configured state dir.
    pub fn new(config: Configuration, display: Arc<dyn DisplaySink>) -> Self {
        let lock = LockManager::new(config.state_dir.join(LOCK_FILE));
        let state = SyncStateTracker::new(&config.state_dir);
        let ledger = config
            .failure_ledger
            .then(|| FailureLedger::new(&config.state_dir));

        Self {
            config,
            display,
            lock,
            state,
            ledger,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    pub fn state(&self) -> &SyncStateTracker {
        &self.state
    }

    /// Perform a sync run under the lock.
    ///
    /// The bucket is checked before the lock is taken; a store that cannot
    /// be reached fails the run without touching any state. The lock is
    /// released on every exit: success, a fatal error, or Ctrl-C. An
    /// interrupted run leaves the start marker without a completion, so the
    /// next run repeats the interrupted work.
    pub async fn run(&self) -> Result<SyncOutcome> {
        self.display.display("Starting, performing pre-sync checks...");
        self.check_store().await?;

        let _guard = self.lock.acquire()?;

        tokio::select! {
            result = self.run_locked() => result,
            Ok(()) = tokio::signal::ctrl_c() => {
                self.display.display("Interrupted, releasing lock.");
                Err(SyncError::Interrupted)
            }
        }
    }

    async fn check_store(&self) -> Result<()> {
        self.config.store.check().await.map_err(|e| {
            SyncError::ConfigurationInvalid(format!(
                "Can't find the bucket {}: {:#}",
                self.config.bucket(),
                e
            ))
        })
    }

    async fn run_locked(&self) -> Result<SyncOutcome> {
        let root = LocalFs::ensure_root(&self.config.local_root)?;
        let filter = FileFilter::from_expression(self.config.filter())?;
        let strategy = DiffStrategy::select(&self.state)?;
        tracing::info!(%strategy, "diff strategy selected");

        if !self.config.dry_run {
            self.state.record_start()?;
        }

        let fetcher =
            RemoteManifestFetcher::with_page_size(self.config.store.clone(), self.config.page_size);
        let diff = DiffEngine::new(root, filter, fetcher);
        let mut selected = self.compute_diff(&diff, strategy).await?;

        if let (Some(ledger), DiffStrategy::Timestamp { .. }) = (&self.ledger, strategy) {
            let retried = ledger.merge_into(&mut selected)?;
            if retried > 0 {
                self.display
                    .display(&format!("Retrying {} file(s) that failed last time...", retried));
            }
        }

        self.display.display(&format!("{} file(s) to push.", selected.len()));

        if self.config.dry_run {
            for record in &selected {
                self.display.display(&format!("Would push {}", record.path()));
            }
            return Ok(SyncOutcome {
                strategy,
                selected,
                report: UploadReport::default(),
                dry_run: true,
            });
        }

        let uploader = Uploader::new(
            self.config.store.clone(),
            self.display.clone(),
            self.config.jobs,
        );
        let report = uploader.upload_all(selected.clone()).await;

        if let Some(ledger) = &self.ledger {
            ledger.store(&report)?;
        }
        // Individual failures do not hold back the checkpoint
        self.state.record_completion()?;

        self.display.display(&format!(
            "Done like a dinner: {} pushed ({}), {} failed.",
            report.uploaded.len(),
            format_size(report.bytes, DECIMAL),
            report.failed.len()
        ));

        Ok(SyncOutcome {
            strategy,
            selected,
            report,
            dry_run: false,
        })
    }

    async fn compute_diff(&self, diff: &DiffEngine, strategy: DiffStrategy) -> Result<Vec<ObjectRecord>> {
        match strategy {
            DiffStrategy::Timestamp { .. } => {
                self.display.display("Performing time based comparison...");
                diff.compute(strategy).await
            }
            DiffStrategy::Checksum => {
                self.display
                    .display("Performing (potentially expensive) checksum comparison...");
                self.display.display("Generating local manifest...");
                let local = diff.local_manifest().await?;
                self.display.display(&format!(
                    "Traversing {} for remote manifest...",
                    self.config.store.display_key("")
                ));
                let remote = diff.remote_manifest().await?;
                // Files removed locally are never removed remotely
                self.display.display("Performing checksum comparison...");
                Ok(checksum_diff(&local, &remote))
            }
        }
    }
}
