pub mod backup;
pub mod eraser;
pub mod manifest;
pub mod purger;

pub use backup::{BackupManager, BackupRecord, BackupStore};
pub use eraser::{Eraser, SecureEraser};
pub use manifest::{CleanManifest, ManifestItem, SessionSummary};
pub use purger::{purge_all, purge_expired, purge_record, PurgeReport};
