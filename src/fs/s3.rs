use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{services::S3, Operator};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::fs::backend::{ObjectStore, S3Provider};
use crate::fs::types::RemoteObject;

/// Size of each chunk streamed from disk into an upload.
const UPLOAD_CHUNK: usize = 8 * 1024 * 1024;

/// S3 and S3-compatible object store using OpenDAL
pub struct S3Store {
    operator: Operator,
    bucket: String,
}

impl S3Store {
    /// Create a store for any supported provider.
    ///
    /// `endpoint` overrides the provider's default endpoint and is required
    /// for [`S3Provider::Custom`]. Credentials fall back to the AWS chain
    /// when absent.
    pub fn new(
        bucket: &str,
        region: &str,
        provider: S3Provider,
        endpoint: Option<&str>,
        credentials: Option<(&str, &str)>,
    ) -> Result<Self> {
        let mut builder = S3::default().bucket(bucket).region(region);

        if let Some((access_key, secret_key)) = credentials {
            builder = builder
                .access_key_id(access_key)
                .secret_access_key(secret_key);
        }

        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| provider.endpoint(region));
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(&endpoint);
        } else if provider == S3Provider::Custom {
            anyhow::bail!("Custom S3 provider requires an endpoint");
        }

        let operator = Operator::new(builder)
            .context("Failed to configure S3 client")?
            .finish();

        Ok(Self {
            operator,
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(&self, marker: Option<&str>, max_keys: usize) -> Result<Vec<RemoteObject>> {
        let mut request = self.operator.lister_with("/").recursive(true).limit(max_keys);
        if let Some(marker) = marker {
            request = request.start_after(marker);
        }
        let lister = request.await.context("Failed to list S3 objects")?;
        let mut lister = std::pin::pin!(lister);

        let mut page = Vec::with_capacity(max_keys);
        while page.len() < max_keys {
            let Some(entry) = lister
                .try_next()
                .await
                .context("Failed to read S3 listing page")?
            else {
                break;
            };

            let meta = entry.metadata();
            // Directory markers are not objects to sync
            if meta.mode().is_dir() {
                continue;
            }

            page.push(RemoteObject::new(
                entry.path().trim_start_matches('/'),
                meta.etag().map(str::to_string),
            ));
        }

        Ok(page)
    }

    async fn put_object(&self, key: &str, local_path: &Path) -> Result<u64> {
        let key = key.trim_start_matches('/');

        let mut file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("Failed to open {}", local_path.display()))?;
        let mut writer = self
            .operator
            .writer_with(key)
            .chunk(UPLOAD_CHUNK)
            .await
            .context("Failed to start S3 upload")?;

        let mut buffer = vec![0u8; UPLOAD_CHUNK];
        let mut written = 0u64;
        loop {
            let read = match file.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e)
                        .with_context(|| format!("Failed to read {}", local_path.display()));
                }
            };
            if let Err(e) = writer.write(buffer[..read].to_vec()).await {
                let _ = writer.abort().await;
                return Err(e).context("Failed to upload to S3");
            }
            written += read as u64;
        }

        writer.close().await.context("Failed to finish S3 upload")?;
        Ok(written)
    }

    async fn check(&self) -> Result<()> {
        self.operator
            .check()
            .await
            .with_context(|| format!("Can't reach bucket {} with the configured credentials", self.bucket))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
