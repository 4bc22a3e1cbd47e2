//! High-level pipeline: orchestrates invalidate → scrape → merge for one folder.
//!
//! A [`Folder`] owns its remote client and both cache namespaces. One run:
//!   1. optionally invalidates both caches (concurrently)
//!   2. streams the paginated listing through the bounded worker pool; each
//!      worker downloads, normalizes and stores one file in the record cache
//!   3. merges every cached record into the host's file collection
//!   4. records the time of the run in the value cache
//!
//! # Error Handling
//! [`Folder::sync`] is best-effort: it never fails the host build. A
//! [`SyncError::Skip`] is logged at debug level, anything else at error
//! level, and the collection is handed back in whatever state the run
//! reached. Use [`Folder::try_sync`] to observe the error instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::cache::JsonFileCache;
use crate::client::ClasseurClient;
use crate::config::{FolderOptions, SyncConfig};
use crate::contract::{Cache, FileCollection, FileDescriptor, FileRecord, RemoteClient};
use crate::download::PaginatedSource;
use crate::error::{Result, SyncError};
use crate::pool::{pump, ItemJob, PoolSummary, WorkerPool};
use crate::preprocess::{cache_key, normalize};

/// Value-cache key holding the RFC 3339 time of the last completed run.
pub const LAST_RUN_KEY: &str = "lastRun";

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub scrape: PoolSummary,
    /// Cached records merged into the collection.
    pub merged: usize,
}

pub struct Folder<C, F, V> {
    config: SyncConfig,
    client: Arc<C>,
    file_cache: Arc<F>,
    value_cache: Arc<V>,
}

impl Folder<ClasseurClient, JsonFileCache<FileRecord>, JsonFileCache<Value>> {
    /// Validates `options` and builds the HTTP client and on-disk caches.
    ///
    /// Fails before any network or disk access if a required option is missing.
    pub fn from_options(options: FolderOptions) -> Result<Self> {
        let config = options.validate()?;
        let client = ClasseurClient::new(&config).map_err(SyncError::Client)?;
        let namespace = config.cache_namespace();
        let file_cache = JsonFileCache::new(&config.cache_dir, &namespace);
        let value_cache = JsonFileCache::new(&config.cache_dir, &format!("{namespace}-values"));
        Ok(Self::new(config, client, file_cache, value_cache))
    }
}

impl<C, F, V> Folder<C, F, V>
where
    C: RemoteClient + 'static,
    F: Cache<FileRecord> + 'static,
    V: Cache<Value> + 'static,
{
    pub fn new(config: SyncConfig, client: C, file_cache: F, value_cache: V) -> Self {
        config.trace_loaded();
        Self {
            config,
            client: Arc::new(client),
            file_cache: Arc::new(file_cache),
            value_cache: Arc::new(value_cache),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs the folder step of the build and hands the collection back.
    pub async fn sync<'a>(&self, files: &'a mut FileCollection) -> &'a mut FileCollection {
        match self.try_sync(files).await {
            Ok(report) => {
                info!(
                    src_id = %self.config.src_id,
                    downloaded = report.scrape.completed,
                    dropped = report.scrape.failed,
                    merged = report.merged,
                    "[SYNC] Folder synchronised"
                );
            }
            Err(err) if err.is_skip() => {
                debug!(src_id = %self.config.src_id, "skipped scrape");
            }
            Err(err) => {
                error!(src_id = %self.config.src_id, error = %err, "[SYNC][ERROR] Folder sync failed");
            }
        }
        files
    }

    /// Same run as [`Folder::sync`], surfacing the first run-level error.
    pub async fn try_sync(&self, files: &mut FileCollection) -> Result<SyncReport> {
        self.invalidate_caches().await?;
        let scrape = self.scrape().await?;
        let merged = self.merge_store(files).await?;
        self.value_cache
            .store(LAST_RUN_KEY, Value::String(Utc::now().to_rfc3339()))
            .await?;
        Ok(SyncReport { scrape, merged })
    }

    async fn invalidate_caches(&self) -> Result<()> {
        if !self.config.invalidate {
            return Ok(());
        }
        info!(src_id = %self.config.src_id, "[SYNC] Invalidating caches");
        futures::future::try_join(self.file_cache.invalidate(), self.value_cache.invalidate())
            .await?;
        Ok(())
    }

    /// Pipes the folder listing into the worker pool until both are done.
    pub async fn scrape(&self) -> Result<PoolSummary> {
        info!(
            src_id = %self.config.src_id,
            concurrency = self.config.concurrency,
            "[SYNC] scrape"
        );
        let mut source = PaginatedSource::new(Arc::clone(&self.client), self.config.src_id.clone());
        let job = Arc::new(StoreFileJob {
            client: Arc::clone(&self.client),
            file_cache: Arc::clone(&self.file_cache),
            dest_path: self.config.dest_path.clone(),
        });
        let pool = WorkerPool::new(job, self.config.concurrency);

        let summary = pump(&mut source, pool).await?;
        info!(
            src_id = %self.config.src_id,
            listed = source.received(),
            pages = source.pages_requested(),
            stored = summary.completed,
            dropped = summary.failed,
            "[SYNC] scrape finished"
        );
        Ok(summary)
    }

    /// Copies every cached record into `files`; cached entries win.
    async fn merge_store(&self, files: &mut FileCollection) -> Result<usize> {
        let cached = self.file_cache.all().await?;
        let count = cached.len();
        debug!(count, src_id = %self.config.src_id, "merging tracked files");
        files.extend(cached);
        Ok(count)
    }
}

/// Download → normalize → store for a single listing entry.
struct StoreFileJob<C, F> {
    client: Arc<C>,
    file_cache: Arc<F>,
    dest_path: String,
}

#[async_trait]
impl<C, F> ItemJob for StoreFileJob<C, F>
where
    C: RemoteClient + 'static,
    F: Cache<FileRecord> + 'static,
{
    type Item = FileDescriptor;

    async fn run(&self, descriptor: FileDescriptor) -> Result<()> {
        debug!(name = %descriptor.name, "downloading file");
        let revision = self
            .client
            .last_content_rev(&descriptor.id)
            .await
            .map_err(|source| SyncError::Download {
                name: descriptor.name.clone(),
                source,
            })?;
        let record = normalize(descriptor, revision);
        let key = cache_key(&self.dest_path, &record.name);
        self.file_cache.store(&key, record).await?;
        debug!(key = %key, "stored file");
        Ok(())
    }
}
