use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "https://app.classeur.io";
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_RETRIES: u32 = 6;
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Options as handed over by the host build, before validation.
///
/// Field names follow the host's camelCase convention, so a JSON or YAML
/// options block deserializes directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderOptions {
    /// Classeur folder id.
    pub src_id: Option<String>,
    /// Path prefix under which the folder's files are placed.
    pub dest_path: Option<String>,
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    /// Drop both cache namespaces before scraping.
    #[serde(default, alias = "invalidateCache")]
    pub invalidate: bool,
    pub concurrency: Option<usize>,
    /// Retry budget for per-file downloads.
    pub retries: Option<u32>,
    pub host: Option<String>,
    pub cache_dir: Option<PathBuf>,
    /// Never touch the network; the run is skipped.
    #[serde(default)]
    pub offline: bool,
}

impl FolderOptions {
    pub fn new(
        src_id: impl Into<String>,
        dest_path: impl Into<String>,
        user_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            src_id: Some(src_id.into()),
            dest_path: Some(dest_path.into()),
            user_id: Some(user_id.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Checks required options and fills in defaults.
    pub fn validate(self) -> Result<SyncConfig, ConfigError> {
        let src_id = required(self.src_id, "srcId")?;
        let dest_path = required(self.dest_path, "destPath")?;
        let user_id = required(self.user_id, "userId")?;
        let api_key = required(self.api_key, "apiKey")?;

        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(concurrency));
        }

        Ok(SyncConfig {
            src_id,
            dest_path,
            user_id,
            api_key,
            invalidate: self.invalidate,
            concurrency,
            download_retry: RetryConfig {
                max_attempts: self.retries.unwrap_or(DEFAULT_RETRIES),
                ..RetryConfig::default()
            },
            host: self
                .host
                .unwrap_or_else(|| DEFAULT_HOST.to_string())
                .trim_end_matches('/')
                .to_string(),
            cache_dir: self
                .cache_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            offline: self.offline,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingOption(name)),
    }
}

/// Validated configuration for one folder.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub src_id: String,
    pub dest_path: String,
    pub user_id: String,
    pub api_key: String,
    pub invalidate: bool,
    pub concurrency: usize,
    pub download_retry: RetryConfig,
    pub host: String,
    pub cache_dir: PathBuf,
    pub offline: bool,
}

impl SyncConfig {
    /// Cache namespace shared by both stores of this folder.
    pub fn cache_namespace(&self) -> String {
        format!("classeur-{}", self.src_id)
    }

    pub fn trace_loaded(&self) {
        info!(
            src_id = %self.src_id,
            dest_path = %self.dest_path,
            concurrency = self.concurrency,
            invalidate = self.invalidate,
            offline = self.offline,
            "Loaded folder config"
        );
        debug!(
            host = %self.host,
            cache_dir = %self.cache_dir.display(),
            api_key_set = !self.api_key.is_empty(),
            retries = self.download_retry.max_attempts,
            "Folder config (full debug)"
        );
    }
}

/// Exponential backoff settings for remote calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRIES,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}
