use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::fs::backend::ObjectStore;
use crate::fs::types::RemoteObject;
use crate::sync::hash::hash_bytes;

/// In-process object store.
///
/// Behaves like S3 for listing purposes: keys come back in lexical order and
/// the ETag of an object is the MD5 of its content. Pages can be capped below
/// the requested size to mimic servers returning short pages, and individual
/// keys can be made to fail on upload.
#[derive(Default)]
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    server_page_cap: Option<usize>,
    failing_keys: Mutex<HashSet<String>>,
    failing_listing: AtomicBool,
    unreachable: AtomicBool,
    stalled_uploads: AtomicBool,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    /// Never return more than `cap` objects per page, whatever the caller asks.
    pub fn with_server_page_cap(mut self, cap: usize) -> Self {
        self.server_page_cap = Some(cap.max(1));
        self
    }

    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.lock_objects()
            .insert(key.trim_start_matches('/').to_string(), data.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock_objects().get(key.trim_start_matches('/')).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make uploads of `key` fail until cleared.
    pub fn fail_uploads_of(&self, key: &str) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.trim_start_matches('/').to_string());
        }
    }

    pub fn clear_upload_failures(&self) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.clear();
        }
    }

    /// Make every listing request fail.
    pub fn fail_listing(&self, fail: bool) {
        self.failing_listing.store(fail, Ordering::SeqCst);
    }

    /// Make the store look missing or inaccessible to [`ObjectStore::check`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make every upload hang until the caller gives up on it.
    pub fn stall_uploads(&self, stall: bool) {
        self.stalled_uploads.store(stall, Ordering::SeqCst);
    }

    /// Number of `list_page` requests served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(&self, marker: Option<&str>, max_keys: usize) -> Result<Vec<RemoteObject>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_listing.load(Ordering::SeqCst) {
            anyhow::bail!("listing unavailable");
        }

        let limit = self.server_page_cap.map_or(max_keys, |cap| cap.min(max_keys));
        let objects = self.lock_objects();
        let page = objects
            .iter()
            .filter(|(key, _)| marker.map_or(true, |m| key.as_str() > m))
            .take(limit)
            .map(|(key, data)| RemoteObject::new(key.clone(), Some(format!("\"{}\"", hash_bytes(data)))))
            .collect();
        Ok(page)
    }

    async fn put_object(&self, key: &str, local_path: &Path) -> Result<u64> {
        let key = key.trim_start_matches('/');
        let failing = self
            .failing_keys
            .lock()
            .map(|keys| keys.contains(key))
            .unwrap_or(false);
        if failing {
            anyhow::bail!("simulated upload failure for {}", key);
        }
        if self.stalled_uploads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let data = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let size = data.len() as u64;
        self.lock_objects().insert(key.to_string(), data);
        Ok(size)
    }

    async fn check(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("bucket {} not found", self.bucket);
        }
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
