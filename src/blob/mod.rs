//! Blob Store Adapter
//!
//! Durable key → bytes storage with URL retrieval. Holds both the generated
//! images and the lineage document itself. The document is written with
//! [`BlobStore::put_if_revision`] so concurrent writers cannot silently
//! overwrite each other.

pub mod fs;
pub mod memory;
pub mod sled_store;

pub use self::fs::FsBlobStore;
pub use self::memory::MemoryBlobStore;
pub use self::sled_store::SledBlobStore;

use crate::error::StorageError;
use crate::types::Revision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Location of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub key: String,
    pub url: String,
}

/// Key → bytes store
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Unconditionally write `bytes` under `key`.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str)
        -> Result<BlobRef, StorageError>;

    /// Read the bytes under `key`; `None` when no blob exists.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write `bytes` only if the current content still has revision `expected`
    /// (`None` = the key must not exist yet). Atomic with respect to every
    /// writer of the same underlying storage, not just this instance.
    async fn put_if_revision(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError>;

    /// Public URL of `key`.
    fn url_for(&self, key: &str) -> String;

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Fs,
    Sled,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BlobBackend,

    /// Root directory for the fs and sled backends
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Key of the lineage document
    #[serde(default = "default_document_key")]
    pub document_key: String,

    /// Base URL images are served from (e.g. a CDN or bucket URL)
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_backend() -> BlobBackend {
    BlobBackend::Fs
}

pub(crate) fn default_storage_root() -> PathBuf {
    directories::ProjectDirs::from("", "", "arbor")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".arbor"))
}

pub(crate) fn default_document_key() -> String {
    "experiments.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_storage_root(),
            document_key: default_document_key(),
            public_base_url: None,
        }
    }
}

/// Open the configured backend.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    let base_url = config.public_base_url.clone();
    let store: Arc<dyn BlobStore> = match config.backend {
        BlobBackend::Fs => Arc::new(FsBlobStore::new(&config.root, base_url)?),
        BlobBackend::Sled => Arc::new(SledBlobStore::open(config.root.join("blobs.sled"), base_url)?),
        BlobBackend::Memory => Arc::new(MemoryBlobStore::with_base_url(base_url)),
    };
    Ok(store)
}

/// Reject keys that are empty or could escape a storage root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    let path = Path::new(key);
    if !path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Fail a conditional write unless `current` matches `expected`.
pub(crate) fn check_revision(
    key: &str,
    current: Option<&[u8]>,
    expected: Option<Revision>,
) -> Result<(), StorageError> {
    if current.map(Revision::of) == expected {
        Ok(())
    } else {
        Err(StorageError::RevisionMismatch {
            key: key.to_string(),
        })
    }
}
