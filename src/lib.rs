#![doc = "classeur-sync: pulls a Classeur folder into a static-site build's file collection."]

//! One [`Folder`] per configured source folder. Each build run lists the
//! folder page by page, downloads the latest revision of every file through a
//! bounded worker pool, caches the normalized records on disk and merges the
//! cache into the build's [`FileCollection`].
//!
//! # Usage
//! ```no_run
//! use classeur_sync::{FileCollection, Folder, FolderOptions};
//!
//! # async fn build() -> Result<(), classeur_sync::SyncError> {
//! let folder = Folder::from_options(FolderOptions::new(
//!     "CRYEgM2Ju4DHKKeqNDOG",
//!     "articles",
//!     "my-user-id",
//!     "my-api-key",
//! ))?;
//! let mut files = FileCollection::new();
//! folder.sync(&mut files).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod pool;
pub mod preprocess;
pub mod retry;
pub mod synchronise;

pub use cache::{JsonFileCache, MemoryCache};
pub use client::ClasseurClient;
pub use config::{FolderOptions, RetryConfig, SyncConfig};
pub use contract::{Cache, ContentRevision, FileCollection, FileDescriptor, FileRecord, RemoteClient};
pub use error::{CacheError, ClientError, ConfigError, SyncError};
pub use synchronise::{Folder, SyncReport};
