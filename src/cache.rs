//! Key/value stores backing the file-record and scalar namespaces.
//!
//! Two implementations of [`Cache`]:
//! - [`JsonFileCache`]: one JSON file per entry, persisted between runs with
//!   atomic writes (temp file + rename)
//! - [`MemoryCache`]: process-local map, cloneable handle
//!
//! ## Storage Layout
//!
//! ```text
//! <cache_dir>/
//!   classeur-<srcId>/                  # file records, keyed by destination path
//!     articles%2Ftest-file.json        # {"key": "articles/test-file", "value": {...}}
//!   classeur-<srcId>-values/           # scalar values
//!     lastRun.json
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::Cache;
use crate::error::CacheError;

/// Persistent namespace stored as a directory of entry files.
///
/// A store writes only its own entry, so concurrent stores to different keys
/// never wait on each other. [`Cache::all`] reads the directory back.
pub struct JsonFileCache<V> {
    dir: PathBuf,
    tmp_seq: AtomicU64,
    _value: PhantomData<fn() -> V>,
}

#[derive(Serialize)]
struct EntryRef<'a, V> {
    key: &'a str,
    value: &'a V,
}

#[derive(Deserialize)]
struct Entry<V> {
    key: String,
    value: V,
}

impl<V> JsonFileCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            dir: dir.as_ref().join(namespace),
            tmp_seq: AtomicU64::new(0),
            _value: PhantomData,
        }
    }

    /// Directory holding the namespace's entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File an entry is stored in.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Keys are destination paths; everything outside `[A-Za-z0-9_-]` is
/// percent-encoded so a key always maps to a single flat file name.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[async_trait]
impl<V> Cache<V> for JsonFileCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn store(&self, key: &str, value: V) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec(&EntryRef { key, value: &value })?;

        let path = self.entry_path(key);
        // unique per write: two stores to one key must not share a temp file
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{seq}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), "Persisted cache entry");
        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, V>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = BTreeMap::new();
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            // temp files end in `.tmp`
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let entry: Entry<V> = serde_json::from_slice(&bytes)?;
            entries.insert(entry.key, entry.value);
        }
        Ok(entries)
    }

    async fn invalidate(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(dir = %self.dir.display(), "Invalidated cache namespace");
        Ok(())
    }
}

/// In-process namespace. Clones share the same entries.
#[derive(Clone)]
pub struct MemoryCache<V> {
    entries: Arc<Mutex<BTreeMap<String, V>>>,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl<V: Clone> MemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, V>> {
        // A poisoned map is still a consistent map: every write is a single insert.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn store(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, V>, CacheError> {
        Ok(self.lock().clone())
    }

    async fn invalidate(&self) -> Result<(), CacheError> {
        self.lock().clear();
        Ok(())
    }
}
