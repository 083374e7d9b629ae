// Backup System Types - snapshots, per-item outcomes and run summaries

use crate::gis::{GisError, ItemDescriptor};
use crate::storage::StorageError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// One item's definition captured on one day
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub item_id: String,
    pub title: String,
    /// Title of the folder the item was found in
    pub folder: String,
    pub captured_on: NaiveDate,
    pub payload: Value,
    /// Object name within the folder prefix
    pub key: String,
}

/// Where a snapshot ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedSnapshot {
    pub key: String,
    pub size_bytes: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_days: u32,
}

impl RetentionPolicy {
    pub fn new(max_age_days: u32) -> Self {
        Self { max_age_days }
    }

    /// Objects last modified strictly before this instant are expired
    ///
    /// Saturates at the earliest representable instant, so nothing expires when the window
    /// reaches past it.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(i64::from(self.max_age_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_expired(&self, last_modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        last_modified < self.cutoff(now)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RETENTION_DAYS)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Failed to fetch item {item_id}: {source}")]
    SourceFetch { item_id: String, source: GisError },

    #[error("Failed to write item {item_id} to {key}: {source}")]
    StorageWrite {
        item_id: String,
        key: String,
        source: StorageError,
    },

    #[error("Failed to delete {key}: {source}")]
    StorageDelete { key: String, source: StorageError },

    #[error("Failed to list {prefix}: {source}")]
    StorageList { prefix: String, source: StorageError },
}

/// Per-item progress
///
/// `Discovered -> Fetched -> Written`, `Discovered -> FetchFailed` or
/// `Fetched -> WriteFailed`. None of the end states stop the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Discovered,
    Fetched,
    Written,
    FetchFailed,
    WriteFailed,
}

impl ItemState {
    pub fn is_failure(&self) -> bool {
        matches!(self, ItemState::FetchFailed | ItemState::WriteFailed)
    }
}

/// Outcome of backing up one item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub account: String,
    pub folder: String,
    pub item_id: String,
    pub title: String,
    pub state: ItemState,
    pub key: Option<String>,
    pub error: Option<String>,
}

impl ItemReport {
    pub fn discovered(account: &str, folder: &str, item: &ItemDescriptor) -> Self {
        Self {
            account: account.to_string(),
            folder: folder.to_string(),
            item_id: item.id.clone(),
            title: item.title.clone(),
            state: ItemState::Discovered,
            key: None,
            error: None,
        }
    }

    pub(crate) fn fetched(&mut self, snapshot: &ItemSnapshot) {
        self.state = ItemState::Fetched;
        self.title = snapshot.title.clone();
    }

    pub(crate) fn written(&mut self, archived: &ArchivedSnapshot) {
        self.state = ItemState::Written;
        self.key = Some(archived.key.clone());
    }

    pub(crate) fn failed(&mut self, state: ItemState, error: &BackupError) {
        self.state = state;
        if let BackupError::StorageWrite { key, .. } = error {
            self.key = Some(key.clone());
        }
        self.error = Some(error.to_string());
    }
}

/// Outcome of pruning one folder prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneSummary {
    pub prefix: String,
    pub examined: usize,
    pub retained: usize,
    pub deleted: Vec<String>,
    /// Expired keys whose deletion failed
    pub failed: Vec<String>,
}

/// Totals for one pass over every account
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub accounts_scanned: usize,
    /// Accounts whose folders could not be listed
    pub account_failures: usize,
    pub folders_processed: usize,
    /// Target folders whose items could not be listed
    pub folder_failures: usize,
    /// Target folders whose archive could not be listed for pruning
    pub prune_failures: usize,
    pub items_skipped: usize,
    pub items_written: usize,
    pub fetch_failures: usize,
    pub write_failures: usize,
    pub objects_pruned: usize,
    pub delete_failures: usize,
    pub items: Vec<ItemReport>,
    pub prunes: Vec<PruneSummary>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: None,
            accounts_scanned: 0,
            account_failures: 0,
            folders_processed: 0,
            folder_failures: 0,
            prune_failures: 0,
            items_skipped: 0,
            items_written: 0,
            fetch_failures: 0,
            write_failures: 0,
            objects_pruned: 0,
            delete_failures: 0,
            items: Vec::new(),
            prunes: Vec::new(),
        }
    }

    pub(crate) fn record_item(&mut self, report: ItemReport) {
        match report.state {
            ItemState::Written => self.items_written += 1,
            ItemState::FetchFailed => self.fetch_failures += 1,
            ItemState::WriteFailed => self.write_failures += 1,
            ItemState::Discovered | ItemState::Fetched => {}
        }
        self.items.push(report);
    }

    pub(crate) fn record_prune(&mut self, prune: PruneSummary) {
        self.objects_pruned += prune.deleted.len();
        self.delete_failures += prune.failed.len();
        self.prunes.push(prune);
    }

    /// Every failure of any kind seen during the run
    pub fn failures(&self) -> usize {
        self.account_failures
            + self.folder_failures
            + self.prune_failures
            + self.fetch_failures
            + self.write_failures
            + self.delete_failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.state.is_failure())
    }
}
