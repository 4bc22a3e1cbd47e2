//! Error types for classeur-sync.
//!
//! Errors are split by where they surface:
//! - [`ConfigError`]: invalid options, reported before any I/O happens
//! - [`ClientError`]: transport and decoding failures from the remote API
//! - [`CacheError`]: failures of the persistent key/value store
//! - [`SyncError`]: run-level error, wrapping the above plus the skip sentinel

use thiserror::Error;

/// Result type alias for synchronisation operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Invalid or missing folder options.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required option was absent or blank.
    #[error("required: options.{0}")]
    MissingOption(&'static str),

    /// The worker pool needs at least one slot.
    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),
}

/// Failure talking to the remote folder API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connection, timeout, TLS, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Network access is disabled for this client.
    #[error("network access disabled")]
    Offline,
}

/// Failure of the persistent cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Run-level error of a folder synchronisation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fetching a listing page failed; fatal to the run.
    #[error("listing page at offset {offset} failed: {source}")]
    Listing {
        offset: usize,
        #[source]
        source: ClientError,
    },

    /// Downloading one file failed; only that file is dropped.
    #[error("download of \"{name}\" failed: {source}")]
    Download {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Constructing the HTTP client failed.
    #[error("client setup failed: {0}")]
    Client(#[source] ClientError),

    /// The worker pool stopped handing out admission slots.
    #[error("worker pool closed")]
    PoolClosed,

    /// Intentional early exit; the run succeeds without fresh files.
    #[error("scrape skipped")]
    Skip,
}

impl SyncError {
    /// Maps a listing failure, turning the offline sentinel into [`SyncError::Skip`].
    pub fn listing(offset: usize, source: ClientError) -> Self {
        match source {
            ClientError::Offline => SyncError::Skip,
            source => SyncError::Listing { offset, source },
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, SyncError::Skip)
    }
}
