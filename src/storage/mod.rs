//! Object storage capability
//!
//! Backups are written to, listed from and deleted from a single bucket. The bucket is bound
//! when the store is constructed so callers only deal in keys.

mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use memory::{MemoryObjectStore, StoredObject};
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Content type of every archived snapshot
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors reported by an object store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Network trouble, throttling or a server-side failure; a later run may succeed
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// Permission, quota or request errors that will not go away on their own
    #[error("Storage failure: {0}")]
    Permanent(String),

    #[error("Object not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

/// An archived object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Bucket-scoped object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or overwrite the object at `key`
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError>;

    /// List every object whose key starts with `prefix`, in key order
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError>;

    /// Delete the object at `key`
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
