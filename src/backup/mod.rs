// Backup core - naming, export, upload, retention and orchestration

pub mod exporter;
pub mod namer;
pub mod orchestrator;
pub mod retention;
pub mod types;
pub mod writer;

pub use exporter::ItemExporter;
pub use namer::{folder_prefix, object_key, sanitize, snapshot_key};
pub use orchestrator::BackupOrchestrator;
pub use retention::RetentionPruner;
pub use types::{
    ArchivedSnapshot, BackupError, ItemReport, ItemSnapshot, ItemState, PruneSummary,
    RetentionPolicy, RunSummary,
};
pub use writer::ArchiveWriter;
