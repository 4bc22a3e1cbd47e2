//! # contract: collaborator interfaces and wire types
//!
//! The pipeline talks to two external collaborators, both behind async traits
//! so that real, in-memory and mock implementations are interchangeable:
//!
//! - [`RemoteClient`]: the folder API (listing pages and per-file revisions)
//! - [`Cache`]: a namespaced key/value store that outlives a single run
//!
//! ## Mocking & Testing
//! - [`RemoteClient`] is annotated for `mockall`; with the default
//!   `test-export-mocks` feature `MockRemoteClient` is available to
//!   integration tests as well.
//! - [`crate::cache::MemoryCache`] is the in-process [`Cache`] used in tests.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{CacheError, ClientError};

/// Number of listing entries requested per page.
pub const PAGE_SIZE: usize = 20;

/// One entry of a folder listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    /// Everything else the listing returned (e.g. `updated`).
    #[serde(flatten)]
    pub listing: Map<String, Value>,
}

impl FileDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            listing: Map::new(),
        }
    }
}

/// Latest content revision of a file, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRevision {
    pub text: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Canonical file record as merged into the host's file collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    #[serde(with = "contents")]
    pub contents: Vec<u8>,
    pub modified_date: DateTime<Utc>,
    /// Flattened listing metadata and revision properties.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// The host's files, keyed by destination path.
pub type FileCollection = BTreeMap<String, FileRecord>;

/// Inclusive item window sent as `Range: items=<start>-<end>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRange {
    pub start: usize,
    pub end: usize,
}

impl ItemRange {
    /// Window of `size` items beginning at `offset`.
    pub fn page(offset: usize, size: usize) -> Self {
        Self {
            start: offset,
            end: offset + size.saturating_sub(1),
        }
    }
}

impl fmt::Display for ItemRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "items={}-{}", self.start, self.end)
    }
}

/// Access to the remote folder API.
///
/// Implementors own authentication and retry policy; callers only see the
/// final outcome of each call.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// One listing page of a folder, most recently updated first.
    async fn list_files(
        &self,
        folder_id: &str,
        range: ItemRange,
    ) -> Result<Vec<FileDescriptor>, ClientError>;

    /// The latest content revision of a file.
    async fn last_content_rev(&self, file_id: &str) -> Result<ContentRevision, ClientError>;
}

/// A namespaced key/value store that persists across runs.
///
/// Writes to different keys are independent; the last write to a key wins.
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    async fn store(&self, key: &str, value: V) -> Result<(), CacheError>;

    /// Every entry currently stored in the namespace.
    async fn all(&self) -> Result<BTreeMap<String, V>, CacheError>;

    /// Drops every entry of the namespace.
    async fn invalidate(&self) -> Result<(), CacheError>;
}

/// File contents are stored as text when they are UTF-8, as a byte array otherwise.
mod contents {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawContents {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(bytes),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(match RawContents::deserialize(deserializer)? {
            RawContents::Text(text) => text.into_bytes(),
            RawContents::Bytes(bytes) => bytes,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

/// Accepts epoch milliseconds or an RFC 3339 string.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let parsed = match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(ms),
        RawTimestamp::Fractional(ms) => DateTime::from_timestamp_millis(ms as i64),
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    };
    parsed.ok_or_else(|| D::Error::custom("invalid `updated` timestamp"))
}
