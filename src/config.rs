//! On-disk configuration.
//!
//! The sync engine itself only sees a resolved [`Configuration`]; this module
//! reads `~/.bucketsync.toml` (or an explicit path) and turns it into one.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::fs::{ObjectStore, S3Provider, S3Store};
use crate::sync::engine::Configuration;
use crate::sync::remote::DEFAULT_PAGE_SIZE;

pub const CONFIG_FILE: &str = ".bucketsync.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Absolute path of the tree to back up.
    pub local_path: PathBuf,
    /// Filter expression, see [`crate::sync::FileFilter`].
    #[serde(default)]
    pub filter: Option<String>,
    /// Where markers and the lock live. Defaults to the home directory.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub provider: S3Provider,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub jobs: usize,
    pub page_size: usize,
    pub failure_ledger: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            page_size: DEFAULT_PAGE_SIZE,
            failure_ledger: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Uploads are network bound; a handful in flight is plenty.
pub fn default_jobs() -> usize {
    num_cpus::get().clamp(1, 8)
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| SyncError::ConfigurationInvalid("cannot determine home directory".into()))
}

impl Config {
    /// `~/.bucketsync.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(home_dir()?.join(CONFIG_FILE))
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigurationInvalid(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&body).map_err(|e| match e {
            SyncError::ConfigurationInvalid(msg) => {
                SyncError::ConfigurationInvalid(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn parse(body: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(body).map_err(|e| SyncError::ConfigurationInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SyncError::ConfigurationInvalid(msg.to_string()));

        if self.remote.bucket.trim().is_empty() {
            return invalid("remote.bucket must not be empty");
        }
        if !self.local_path.is_absolute() {
            return invalid("local_path must be absolute (i.e. /var/www not ./www)");
        }
        if self.sync.jobs == 0 {
            return invalid("sync.jobs must be at least 1");
        }
        if self.sync.page_size == 0 {
            return invalid("sync.page_size must be at least 1");
        }
        if self.remote.provider == S3Provider::Custom && self.remote.endpoint.is_none() {
            return invalid("remote.endpoint is required for the custom provider");
        }
        if self.remote.access_key.is_some() != self.remote.secret_key.is_some() {
            return invalid("remote.access_key and remote.secret_key must be set together");
        }
        Ok(())
    }

    /// Directory holding the sync markers, lock and failure ledger.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => home_dir(),
        }
    }

    /// Build the S3 client described by `[remote]`.
    pub fn build_store(&self) -> Result<Arc<dyn ObjectStore>> {
        let remote = &self.remote;
        let credentials = match (&remote.access_key, &remote.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        };
        let store = S3Store::new(
            &remote.bucket,
            &remote.region,
            remote.provider.clone(),
            remote.endpoint.as_deref(),
            credentials,
        )
        .map_err(|e| SyncError::ConfigurationInvalid(format!("{:#}", e)))?;
        tracing::debug!(
            bucket = %remote.bucket,
            provider = remote.provider.display_name(),
            "object store configured"
        );
        Ok(Arc::new(store))
    }

    /// Resolve into the value the sync engine consumes.
    pub fn resolve(&self) -> Result<Configuration> {
        let configuration = Configuration::new(&self.local_path, self.build_store()?)
            .with_filter(self.filter.clone())
            .with_state_dir(self.state_dir()?)
            .with_jobs(self.sync.jobs)
            .with_page_size(self.sync.page_size)
            .with_failure_ledger(self.sync.failure_ledger);
        Ok(configuration)
    }
}
