use super::namer::folder_prefix;
use super::types::{BackupError, PruneSummary, RetentionPolicy};
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Deletes archived snapshots that have outlived the retention window
pub struct RetentionPruner<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    key_prefix: &'a str,
    policy: RetentionPolicy,
}

impl<'a, S: ObjectStore + ?Sized> RetentionPruner<'a, S> {
    pub fn new(store: &'a S, key_prefix: &'a str, policy: RetentionPolicy) -> Self {
        Self {
            store,
            key_prefix,
            policy,
        }
    }

    /// Delete every object under the folder's prefix last modified before `now - retention`
    ///
    /// Failing to delete one object is recorded in the summary and does not stop the rest.
    /// Only a failed listing is returned as an error.
    pub async fn prune(&self, folder: &str, now: DateTime<Utc>) -> Result<PruneSummary, BackupError> {
        let prefix = folder_prefix(self.key_prefix, folder);
        let objects = self
            .store
            .list(&prefix)
            .await
            .map_err(|source| BackupError::StorageList {
                prefix: prefix.clone(),
                source,
            })?;

        let mut summary = PruneSummary {
            prefix: prefix.clone(),
            examined: objects.len(),
            ..Default::default()
        };

        for object in objects {
            if !self.policy.is_expired(object.last_modified, now) {
                summary.retained += 1;
                continue;
            }

            match self.store.delete(&object.key).await {
                Ok(()) => {
                    info!(key = %object.key, last_modified = %object.last_modified, "Deleted expired backup");
                    summary.deleted.push(object.key);
                }
                Err(source) => {
                    let err = BackupError::StorageDelete {
                        key: object.key.clone(),
                        source,
                    };
                    error!(key = %object.key, error = %err, "Failed to delete expired backup");
                    summary.failed.push(object.key);
                }
            }
        }

        info!(
            prefix = %prefix,
            examined = summary.examined,
            deleted = summary.deleted.len(),
            retained = summary.retained,
            failed = summary.failed.len(),
            "Retention pass finished"
        );

        Ok(summary)
    }
}
