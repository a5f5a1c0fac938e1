//! Filesystem blob storage
//!
//! Blobs are files under `{root}/{key}`. Writes go to a temp file first and
//! are renamed into place so readers never observe a partially written blob.
//!
//! Conditional writes hold an exclusive `.{key}.lock` file next to the blob
//! for the whole read, revision check and rename. The file is created with
//! `create_new`, so every store over the same root takes part, including
//! stores in other processes. A lock older than [`STALE_LOCK_AFTER`] is
//! treated as left behind by a crashed writer and removed.

use crate::blob::{check_revision, join_url, validate_key, BlobRef, BlobStore};
use crate::error::StorageError;
use crate::types::Revision;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Pause between attempts to take a held blob lock.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Age after which a blob lock is considered abandoned.
pub const STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
    /// Serializes conditional writes on this instance before the lock file
    /// is contended.
    cas_lock: Mutex<()>,
}

/// Held blob lock file; removed on drop.
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(lock = ?self.path, error = %e, "Failed to release blob lock");
            }
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.lock", file_name))
}

async fn lock_is_stale(lock_path: &Path) -> bool {
    match fs::metadata(lock_path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age > STALE_LOCK_AFTER)
            .unwrap_or(false),
        Err(_) => false,
    }
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(
        root: P,
        public_base_url: Option<String>,
    ) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create blob root {:?}: {}", root, e),
            ))
        })?;
        Ok(Self {
            root,
            public_base_url,
            cas_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read blob {:?}: {}", path, e),
            ))),
        }
    }

    /// Take the exclusive lock file guarding `path`, waiting while another
    /// writer holds it. Cancelling the wait leaves no lock behind.
    async fn acquire_lock(&self, path: &Path) -> Result<LockFile, StorageError> {
        let lock_path = lock_path_for(path);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create parent directory {:?}: {}", parent, e),
                ))
            })?;
        }

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(_) => return Ok(LockFile { path: lock_path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&lock_path).await {
                        warn!(lock = ?lock_path, "Removing stale blob lock");
                        match fs::remove_file(&lock_path).await {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => {
                                return Err(StorageError::IoError(std::io::Error::new(
                                    e.kind(),
                                    format!("Failed to remove stale lock {:?}: {}", lock_path, e),
                                )))
                            }
                        }
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => {
                    return Err(StorageError::IoError(std::io::Error::new(
                        e.kind(),
                        format!("Failed to create lock {:?}: {}", lock_path, e),
                    )))
                }
            }
        }
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create parent directory {:?}: {}", parent, e),
                ))
            })?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&temp_path, bytes).await.map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write blob to {:?}: {}", temp_path, e),
            ))
        })?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", path, e),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<BlobRef, StorageError> {
        let path = self.path_for(key)?;
        self.write_atomic(&path, bytes).await?;
        Ok(BlobRef {
            key: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        self.read(&path).await
    }

    async fn put_if_revision(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError> {
        let path = self.path_for(key)?;
        let _guard = self.cas_lock.lock().await;
        let _lock = self.acquire_lock(&path).await?;
        let current = self.read(&path).await?;
        check_revision(key, current.as_deref(), expected)?;
        self.write_atomic(&path, bytes).await?;
        Ok(Revision::of(bytes))
    }

    fn url_for(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => join_url(base, key),
            None => format!("file://{}", self.root.join(key).display()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "fs"
    }
}
