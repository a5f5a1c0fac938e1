//! Sled-backed blob storage

use crate::blob::{join_url, validate_key, BlobRef, BlobStore};
use crate::error::StorageError;
use crate::types::Revision;
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

const TREE_BLOBS: &str = "blobs";

/// Sled-based implementation of [`BlobStore`]
pub struct SledBlobStore {
    db: sled::Db,
    blobs: sled::Tree,
    public_base_url: Option<String>,
}

impl SledBlobStore {
    /// Open (or create) a sled database at `path`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        public_base_url: Option<String>,
    ) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_unavailable)?;
        Self::from_db(db, public_base_url)
    }

    pub fn from_db(db: sled::Db, public_base_url: Option<String>) -> Result<Self, StorageError> {
        let blobs = db.open_tree(TREE_BLOBS).map_err(to_unavailable)?;
        Ok(Self {
            db,
            blobs,
            public_base_url,
        })
    }

    /// Get the underlying sled database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_async().await.map_err(to_unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SledBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<BlobRef, StorageError> {
        validate_key(key)?;
        self.blobs
            .insert(key.as_bytes(), bytes)
            .map_err(to_unavailable)?;
        self.flush().await?;
        Ok(BlobRef {
            key: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        let value = self.blobs.get(key.as_bytes()).map_err(to_unavailable)?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn put_if_revision(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError> {
        validate_key(key)?;
        let result = self.blobs.transaction(|tx| {
            let current = tx.get(key.as_bytes())?;
            if current.as_deref().map(Revision::of) != expected {
                return Err(ConflictableTransactionError::Abort(()));
            }
            tx.insert(key.as_bytes(), bytes)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                self.flush().await?;
                Ok(Revision::of(bytes))
            }
            Err(TransactionError::Abort(())) => Err(StorageError::RevisionMismatch {
                key: key.to_string(),
            }),
            Err(TransactionError::Storage(e)) => Err(to_unavailable(e)),
        }
    }

    fn url_for(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => join_url(base, key),
            None => format!("sled://{}/{}", TREE_BLOBS, key),
        }
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

fn to_unavailable(err: sled::Error) -> StorageError {
    match err {
        sled::Error::Io(io) => StorageError::IoError(io),
        other => StorageError::Unavailable(format!("sled: {}", other)),
    }
}
