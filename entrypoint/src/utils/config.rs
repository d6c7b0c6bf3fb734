use std::time::Duration;

use clap::Args;
use common::storage::{is_public_object_url, public_object_prefix};
use fetcher::{FetcherConfig, FetcherError};
use image_cache::{CacheConfig, ImageRegistry};
use thiserror::Error;

const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to build image client: {0}")]
    Fetcher(#[from] FetcherError),
    #[error("Cache capacity must be at least 1")]
    EmptyCache,
    #[error("Cache budget of {0} MB does not fit in memory")]
    CacheBudgetTooLarge(usize),
}

/// Image pipeline settings shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct ImageArgs {
    /// Maximum number of decoded images kept in memory
    #[arg(long, env = "IMAGE_CACHE_CAPACITY", default_value_t = 256)]
    pub cache_capacity: usize,

    /// Memory budget for decoded images in megabytes, 0 disables the budget
    #[arg(long, env = "IMAGE_CACHE_MAX_MB", default_value_t = 256)]
    pub cache_max_mb: usize,

    #[arg(long, env = "IMAGE_FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "IMAGE_FETCH_RETRIES", default_value_t = 2)]
    pub fetch_retries: u32,

    /// Allow plain http image URLs
    #[arg(long, env = "IMAGE_ALLOW_HTTP", default_value_t = false)]
    pub allow_http: bool,
}

impl ImageArgs {
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::EmptyCache);
        }

        let max_bytes = match self.cache_max_mb {
            0 => None,
            megabytes => Some(
                megabytes
                    .checked_mul(BYTES_PER_MEGABYTE)
                    .ok_or(ConfigError::CacheBudgetTooLarge(megabytes))?,
            ),
        };

        Ok(CacheConfig {
            max_entries: self.cache_capacity,
            max_bytes,
        })
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::default()
            .with_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_max_retries(self.fetch_retries)
            .with_https_only(!self.allow_http)
    }

    pub fn build_registry(&self) -> Result<ImageRegistry, ConfigError> {
        Ok(ImageRegistry::with_http(
            self.fetcher_config(),
            self.cache_config()?,
        )?)
    }
}

/// Which images a server is willing to fetch on behalf of its callers.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Project URL, only objects in its public buckets are served
    #[arg(long, env = "SUPABASE_URL")]
    pub storage_base_url: String,
}

impl StorageArgs {
    pub fn allows(&self, url: &str) -> bool {
        is_public_object_url(&self.storage_base_url, url)
    }

    pub fn public_prefix(&self) -> String {
        public_object_prefix(&self.storage_base_url)
    }
}
