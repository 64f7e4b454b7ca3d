//! Archive blob storage collaborator.
//!
//! Blobs are content-addressed, so storing the same archive twice is a no-op
//! and a blob written by a publish that later fails is harmless.
//!
//! Filesystem layout:
//! ```text
//! <root>/
//!   <first two hex chars>/
//!     <sha-256 hex>     : archive bytes
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::integrity::ContentHash;

/// Storage for package archive contents.
pub trait BlobStore: Send + Sync {
    /// Store `data`, returning its content reference.
    fn put(&self, data: &[u8]) -> Result<ContentHash, StoreError>;

    /// Fetch the bytes for `hash`, verified against it.
    fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Blob store held in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs stored.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, data: &[u8]) -> Result<ContentHash, StoreError> {
        let hash = ContentHash::compute(data);
        self.blobs
            .write()
            .entry(hash.clone())
            .or_insert_with(|| data.to_vec());
        Ok(hash)
    }

    fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().get(hash).cloned())
    }
}

/// Blob store backed by a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a blob store rooted at the given directory.
    pub fn new(root: PathBuf) -> Self {
        FsBlobStore { root }
    }

    /// Get the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.shard()).join(hash.as_str())
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, data: &[u8]) -> Result<ContentHash, StoreError> {
        let hash = ContentHash::compute(data);
        let path = self.blob_path(&hash);
        if path.is_file() {
            return Ok(hash);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(hash)
    }

    fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.blob_path(hash);
        if !path.is_file() {
            return Ok(None);
        }

        let data = std::fs::read(&path)?;
        if !hash.verify(&data) {
            return Err(StoreError::Integrity {
                hash: hash.to_string(),
            });
        }
        Ok(Some(data))
    }
}
