use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::fs::types::RemoteObject;

/// S3-compatible storage providers
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum S3Provider {
    #[default]
    Aws,
    DigitalOcean,
    Hetzner,
    MinIO,
    R2,
    Wasabi,
    Custom,
}

impl S3Provider {
    /// Get the endpoint URL for this provider.
    ///
    /// For R2 the `region` is the Cloudflare account id. `Custom` has no
    /// implied endpoint and must be configured explicitly.
    pub fn endpoint(&self, region: &str) -> Option<String> {
        match self {
            S3Provider::Aws => None, // Use default AWS endpoint
            S3Provider::DigitalOcean => Some(format!("https://{}.digitaloceanspaces.com", region)),
            S3Provider::Hetzner => Some(format!("https://{}.your-objectstorage.com", region)),
            S3Provider::MinIO => Some("http://localhost:9000".to_string()),
            S3Provider::R2 => Some(format!("https://{}.r2.cloudflarestorage.com", region)),
            S3Provider::Wasabi => Some(format!("https://s3.{}.wasabisys.com", region)),
            S3Provider::Custom => None,
        }
    }

    /// Get display name for the provider
    pub fn display_name(&self) -> &'static str {
        match self {
            S3Provider::Aws => "AWS S3",
            S3Provider::DigitalOcean => "DigitalOcean Spaces",
            S3Provider::Hetzner => "Hetzner Object Storage",
            S3Provider::MinIO => "MinIO",
            S3Provider::R2 => "Cloudflare R2",
            S3Provider::Wasabi => "Wasabi",
            S3Provider::Custom => "S3-compatible",
        }
    }
}

/// The remote side of a sync: a flat bucket of keyed objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List up to `max_keys` objects in key order, starting after `marker`.
    ///
    /// Pages may come back short before the end of the bucket; only an empty
    /// page means the listing is exhausted.
    async fn list_page(&self, marker: Option<&str>, max_keys: usize) -> Result<Vec<RemoteObject>>;

    /// Stream a local file into the bucket under `key`, returning the number
    /// of bytes written.
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<u64>;

    /// Verify the credentials work and the bucket exists.
    async fn check(&self) -> Result<()>;

    /// Bucket this store writes into.
    fn bucket(&self) -> &str;

    /// Human readable location of a key.
    fn display_key(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key.trim_start_matches('/'))
    }
}
