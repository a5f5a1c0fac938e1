//! In-memory blob storage, for tests and embedding.

use crate::blob::{check_revision, join_url, validate_key, BlobRef, BlobStore};
use crate::error::StorageError;
use crate::types::Revision;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
    public_base_url: Option<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(public_base_url: Option<String>) -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            public_base_url,
        }
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.read().get(key).map(|b| b.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<BlobRef, StorageError> {
        validate_key(key)?;
        self.blobs.write().insert(
            key.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(BlobRef {
            key: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.blobs.read().get(key).map(|b| b.bytes.clone()))
    }

    async fn put_if_revision(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError> {
        validate_key(key)?;
        let mut blobs = self.blobs.write();
        check_revision(key, blobs.get(key).map(|b| b.bytes.as_slice()), expected)?;
        blobs.insert(
            key.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_type: "application/json".to_string(),
            },
        );
        Ok(Revision::of(bytes))
    }

    fn url_for(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => join_url(base, key),
            None => format!("memory://{}", key),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
