// Backup Orchestrator - accounts -> target folders -> prune -> export -> write

use super::exporter::ItemExporter;
use super::retention::RetentionPruner;
use super::types::{ItemReport, ItemState, RetentionPolicy, RunSummary};
use super::writer::ArchiveWriter;
use crate::config::BackupConfig;
use crate::gis::{Folder, GisClient, ItemDescriptor};
use crate::storage::ObjectStore;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives one backup pass over every configured account
///
/// Work is strictly sequential. Nothing is persisted between runs; running again is the
/// recovery mechanism.
pub struct BackupOrchestrator<'a, G: GisClient + ?Sized, S: ObjectStore + ?Sized> {
    config: &'a BackupConfig,
    gis: &'a G,
    store: &'a S,
}

impl<'a, G, S> BackupOrchestrator<'a, G, S>
where
    G: GisClient + ?Sized,
    S: ObjectStore + ?Sized,
{
    pub fn new(config: &'a BackupConfig, gis: &'a G, store: &'a S) -> Self {
        Self { config, gis, store }
    }

    /// Back up every target folder of every account as of `now`
    ///
    /// Per-account, per-folder, per-item and per-object failures are logged and counted in
    /// the returned summary; the run itself never fails.
    pub async fn run(&self, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::new(now);
        let span = info_span!("backup_run", run_id = %summary.run_id);

        async {
            info!(
                accounts = self.config.accounts.len(),
                target_folders = ?self.config.target_folders,
                folder_match = ?self.config.folder_match,
                retention_days = self.config.retention_days,
                folder_retention = ?self.config.folder_retention,
                "Starting backup run"
            );

            for account in &self.config.accounts {
                self.backup_account(account, now, &mut summary).await;
            }

            summary.finished_at = Some(Utc::now());

            if summary.is_clean() {
                info!(
                    items_written = summary.items_written,
                    objects_pruned = summary.objects_pruned,
                    "Backup run finished"
                );
            } else {
                warn!(
                    items_written = summary.items_written,
                    objects_pruned = summary.objects_pruned,
                    failures = summary.failures(),
                    fetch_failures = summary.fetch_failures,
                    write_failures = summary.write_failures,
                    delete_failures = summary.delete_failures,
                    "Backup run finished with failures"
                );
            }
        }
        .instrument(span)
        .await;

        summary
    }

    async fn backup_account(&self, account: &str, now: DateTime<Utc>, summary: &mut RunSummary) {
        summary.accounts_scanned += 1;

        let folders = match self.gis.list_folders(account).await {
            Ok(folders) => folders,
            Err(e) => {
                error!(account = %account, error = %e, "Failed to list folders, skipping account");
                summary.account_failures += 1;
                return;
            }
        };

        let targets: Vec<Folder> = folders
            .into_iter()
            .filter(|f| self.config.is_target_folder(&f.title))
            .collect();

        if targets.is_empty() {
            warn!(account = %account, "No target folders found");
            return;
        }

        for folder in &targets {
            self.backup_folder(account, folder, now, summary).await;
        }
    }

    async fn backup_folder(&self, account: &str, folder: &Folder, now: DateTime<Utc>, summary: &mut RunSummary) {
        summary.folders_processed += 1;
        info!(account = %account, folder = %folder.title, "Processing folder");

        // Prune before writing so today's snapshots are never candidates
        let pruner = RetentionPruner::new(
            self.store,
            &self.config.key_prefix,
            RetentionPolicy::new(self.config.retention_for(&folder.title)),
        );
        match pruner.prune(&folder.title, now).await {
            Ok(prune) => summary.record_prune(prune),
            Err(e) => {
                error!(folder = %folder.title, error = %e, "Retention pass failed");
                summary.prune_failures += 1;
            }
        }

        let items = match self.gis.list_items(account, folder).await {
            Ok(items) => items,
            Err(e) => {
                error!(account = %account, folder = %folder.title, error = %e, "Failed to list folder items");
                summary.folder_failures += 1;
                return;
            }
        };

        let captured_on = now.date_naive();
        for item in &items {
            if !self.config.is_backup_type(&item.item_type) {
                debug!(item_id = %item.id, item_type = %item.item_type, "Skipping item type");
                summary.items_skipped += 1;
                continue;
            }
            let report = self.backup_item(account, folder, item, captured_on).await;
            summary.record_item(report);
        }
    }

    async fn backup_item(
        &self,
        account: &str,
        folder: &Folder,
        item: &ItemDescriptor,
        captured_on: NaiveDate,
    ) -> ItemReport {
        let mut report = ItemReport::discovered(account, &folder.title, item);
        info!(item_id = %item.id, title = %item.title, item_type = %item.item_type, "Backing up item");

        let snapshot = match ItemExporter::new(self.gis)
            .export(&folder.title, &item.id, captured_on)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Failed to fetch item");
                report.failed(ItemState::FetchFailed, &e);
                return report;
            }
        };
        report.fetched(&snapshot);

        match ArchiveWriter::new(self.store, &self.config.key_prefix)
            .write(&snapshot)
            .await
        {
            Ok(archived) => report.written(&archived),
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Failed to archive item");
                report.failed(ItemState::WriteFailed, &e);
            }
        }

        report
    }
}
