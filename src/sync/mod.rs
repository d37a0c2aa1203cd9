//! One-way synchronization of a local tree into a bucket.
//!
//! Change detection picks between a cheap timestamp diff and a full
//! checksum diff depending on whether a previous run completed.

pub mod diff;
pub mod engine;
pub mod filter;
pub mod hash;
pub mod ledger;
pub mod lock;
pub mod manifest;
pub mod record;
pub mod remote;
pub mod state;
pub mod upload;

pub use diff::{checksum_diff, modified_since, DiffEngine, DiffStrategy};
pub use engine::{Configuration, SyncEngine, SyncOutcome, LOCK_FILE};
pub use filter::FileFilter;
pub use hash::{hash_bytes, hash_file};
pub use ledger::FailureLedger;
pub use lock::{LockGuard, LockManager, LockRecord};
pub use manifest::LocalManifestBuilder;
pub use record::{Manifest, ObjectRecord};
pub use remote::{RemoteManifestFetcher, DEFAULT_PAGE_SIZE};
pub use state::SyncStateTracker;
pub use upload::{FailedUpload, UploadReport, Uploader};
