//! `ago-backup`: one backup pass over the configured portal accounts.
//!
//! Exits non-zero only when configuration, sign-in or the storage check fails before any
//! work starts. Per-item failures are logged and summarized, and the process still exits 0.

use ago_backup::backup::BackupOrchestrator;
use ago_backup::config::AppConfig;
use ago_backup::gis::PortalClient;
use ago_backup::storage::S3ObjectStore;
use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ago_backup=info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    info!(
        portal = %config.portal.url,
        bucket = %config.storage.bucket,
        endpoint = %config.storage.endpoint,
        "Configuration loaded"
    );

    let portal = PortalClient::connect(&config.portal)
        .await
        .context("failed to sign in to the portal")?;

    let store = S3ObjectStore::connect(&config.storage).await;
    store
        .check_bucket()
        .await
        .with_context(|| format!("cannot access bucket {}", config.storage.bucket))?;

    let summary = BackupOrchestrator::new(&config.backup, &portal, &store)
        .run(chrono::Utc::now())
        .await;

    for item in summary.failed_items() {
        error!(
            item_id = %item.item_id,
            folder = %item.folder,
            state = ?item.state,
            key = ?item.key,
            error = item.error.as_deref().unwrap_or(""),
            "Item not backed up"
        );
    }

    info!(
        run_id = %summary.run_id,
        accounts = summary.accounts_scanned,
        folders = summary.folders_processed,
        written = summary.items_written,
        skipped = summary.items_skipped,
        pruned = summary.objects_pruned,
        failures = summary.failures(),
        "Done"
    );

    Ok(())
}
