//! Byte blob storage for datasets and constructed artifacts.
//!
//! Keys are `/`-separated relative paths such as `pir/<service_id>/table.cbor`.

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use pir_core::PirError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Blob I/O error: {0}")]
    Io(String),
}

impl From<BlobError> for PirError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(_) => PirError::Lookup(e.to_string()),
            _ => PirError::Storage(e.to_string()),
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Write `bytes` under `key`, replacing any previous blob atomically.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

/// Reject keys that could escape the store root.
pub(crate) fn check_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}
