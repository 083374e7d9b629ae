//! # ago-backup
//!
//! Periodic JSON backups of ArcGIS Online content to S3-compatible object storage.
//!
//! ## Overview
//!
//! For every configured account the orchestrator walks the account's folders, picks the
//! folders named in the configuration, prunes archived snapshots older than the retention
//! window and then exports every whitelisted item (web maps, experiences, ...) as a JSON
//! document under a folder-scoped key:
//!
//! ```text
//! ago_backups/{folder}/{YYYY_MM_DD}_{item title}_{item id}.json
//! ```
//!
//! Failures are isolated per item and per archived object. A run always finishes and reports
//! a [`backup::RunSummary`]; only configuration and authentication problems are fatal.
//!
//! ## Quick Start
//!
//! ```rust
//! use ago_backup::backup::BackupOrchestrator;
//! use ago_backup::config::BackupConfig;
//! use ago_backup::gis::{ItemDescriptor, MemoryPortal};
//! use ago_backup::storage::MemoryObjectStore;
//! use serde_json::json;
//!
//! # async fn example() -> ago_backup::Result<()> {
//! let portal = MemoryPortal::new();
//! portal.add_item(
//!     "gis_admin",
//!     "Badger Sightings Survey",
//!     ItemDescriptor::new("abc123", "Web Map", "Sightings Map"),
//!     json!({"operationalLayers": []}),
//! );
//!
//! let config = BackupConfig::for_accounts(["gis_admin"], ["Badger Sightings Survey"]);
//! let store = MemoryObjectStore::new();
//!
//! let summary = BackupOrchestrator::new(&config, &portal, &store)
//!     .run(chrono::Utc::now())
//!     .await;
//! assert_eq!(summary.items_written, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`backup`]: naming, export, upload, retention and orchestration
//! - [`gis`]: the portal capability and its REST and in-memory implementations
//! - [`storage`]: the object store capability and its S3 and in-memory implementations
//! - [`config`]: environment-sourced configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for ago-backup operations
pub type Result<T> = std::result::Result<T, AgoBackupError>;

/// Main error type for ago-backup operations
#[derive(Error, Debug)]
pub enum AgoBackupError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Portal communication or authentication error
    #[error("Portal error: {0}")]
    Gis(#[from] gis::GisError),

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// Per-item or per-object backup error
    #[error("Backup error: {0}")]
    Backup(#[from] backup::BackupError),
}

/// Snapshot naming, export, upload, retention and orchestration
pub mod backup;

/// Environment-sourced configuration
pub mod config;

/// GIS portal capability
pub mod gis;

/// Object storage capability
pub mod storage;
