use super::namer::object_key;
use super::types::{ArchivedSnapshot, BackupError, ItemSnapshot};
use crate::storage::{ObjectStore, JSON_CONTENT_TYPE};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::info;

/// Uploads snapshots under their folder prefix
pub struct ArchiveWriter<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    key_prefix: &'a str,
}

impl<'a, S: ObjectStore + ?Sized> ArchiveWriter<'a, S> {
    pub fn new(store: &'a S, key_prefix: &'a str) -> Self {
        Self { store, key_prefix }
    }

    /// Full key the snapshot is stored at
    pub fn key_for(&self, snapshot: &ItemSnapshot) -> String {
        object_key(self.key_prefix, &snapshot.folder, &snapshot.key)
    }

    /// Serialize the payload and put it at `{prefix}/{folder}/{snapshot key}`
    ///
    /// An existing object at that key is overwritten, so repeating a run on the same day is
    /// idempotent.
    pub async fn write(&self, snapshot: &ItemSnapshot) -> Result<ArchivedSnapshot, BackupError> {
        let key = self.key_for(snapshot);

        // serde_json maps are ordered, which makes the compact rendering canonical
        let body = snapshot.payload.to_string().into_bytes();

        let mut hasher = Sha256::new();
        hasher.update(&body);
        let checksum = format!("{:x}", hasher.finalize());
        let size_bytes = body.len() as u64;

        let metadata = BTreeMap::from([
            ("item-id".to_string(), snapshot.item_id.clone()),
            ("captured-on".to_string(), snapshot.captured_on.to_string()),
            ("sha256".to_string(), checksum.clone()),
        ]);

        self.store
            .put(&key, body, JSON_CONTENT_TYPE, &metadata)
            .await
            .map_err(|source| BackupError::StorageWrite {
                item_id: snapshot.item_id.clone(),
                key: key.clone(),
                source,
            })?;

        info!(item_id = %snapshot.item_id, key = %key, size_bytes = size_bytes, "Snapshot archived");

        Ok(ArchivedSnapshot {
            key,
            size_bytes,
            checksum,
        })
    }
}
