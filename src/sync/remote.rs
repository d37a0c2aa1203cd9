//! Remote manifest fetching.

use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::fs::ObjectStore;
use crate::sync::record::{Manifest, ObjectRecord};

/// Default number of keys requested per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Enumerates every object in the bucket, one page at a time.
pub struct RemoteManifestFetcher {
    store: Arc<dyn ObjectStore>,
    page_size: usize,
}

impl RemoteManifestFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    /// A page size of zero is treated as one.
    pub fn with_page_size(store: Arc<dyn ObjectStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch the full remote manifest.
    ///
    /// Each request after the first continues from the last key of the
    /// previous page. The listing ends on the first empty page; a short page
    /// is not treated as the end because stores may return them mid-listing.
    /// Any failed request fails the whole fetch, since a partial manifest
    /// would make unchanged files look missing.
    pub async fn fetch(&self) -> Result<Manifest> {
        let mut manifest = Manifest::new();
        let mut marker: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .store
                .list_page(marker.as_deref(), self.page_size)
                .await
                .map_err(|source| SyncError::RemoteListing {
                    marker: marker.clone(),
                    source,
                })?;

            let Some(last) = page.last() else {
                break;
            };
            let next_marker = last.key.clone();
            if marker.as_deref() == Some(next_marker.as_str()) {
                // A store that ignores the marker would otherwise loop forever
                return Err(SyncError::RemoteListing {
                    marker,
                    source: anyhow::anyhow!("listing did not advance past marker"),
                });
            }

            pages += 1;
            tracing::debug!(page = pages, objects = page.len(), "fetched listing page");
            manifest.extend(
                page.iter()
                    .map(|object| ObjectRecord::from_remote(&object.key, object.etag.as_deref())),
            );
            marker = Some(next_marker);
        }

        tracing::info!(
            bucket = self.store.bucket(),
            objects = manifest.len(),
            pages,
            "remote manifest fetched"
        );
        Ok(manifest)
    }
}
