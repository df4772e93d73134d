use chrono::{Duration, Utc};

use super::backup::{BackupManager, BackupRecord};
use crate::scanner::walker::dir_size;

/// Report from a purge operation
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub purged: Vec<PurgedBackup>,
    pub total_bytes_freed: u64,
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct PurgedBackup {
    pub id: String,
    pub bytes_freed: u64,
}

/// Purge backups older than the retention window.
/// Only ever called by the host; the engine never purges on its own.
pub fn purge_expired(manager: &BackupManager, retention_days: u32) -> std::io::Result<PurgeReport> {
    let cutoff = Utc::now() - Duration::days(retention_days as i64);
    let expired: Vec<BackupRecord> = manager
        .list_records()?
        .into_iter()
        .filter(|r| r.created_at < cutoff)
        .collect();
    purge_records(manager, &expired)
}

/// Purge one backup by id
pub fn purge_record(manager: &BackupManager, id: &str) -> std::io::Result<PurgeReport> {
    match manager.find_record(id)? {
        Some(record) => purge_records(manager, &[record]),
        None => Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Backup '{}' not found", id),
        )),
    }
}

/// Purge ALL backups in the index
pub fn purge_all(manager: &BackupManager) -> std::io::Result<PurgeReport> {
    let records = manager.list_records()?;
    purge_records(manager, &records)
}

fn purge_records(manager: &BackupManager, records: &[BackupRecord]) -> std::io::Result<PurgeReport> {
    let mut report = PurgeReport::default();
    let mut forgotten = Vec::new();

    for record in records {
        let path = &record.backup_path;
        if !path.exists() {
            // already gone, just drop it from the index
            forgotten.push(record.id.clone());
            continue;
        }

        let size = dir_size(path);
        let removed = if record.is_dir {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };

        match removed {
            Ok(()) => {
                report.purged.push(PurgedBackup {
                    id: record.id.clone(),
                    bytes_freed: size,
                });
                report.total_bytes_freed += size;
                forgotten.push(record.id.clone());
            }
            Err(e) => {
                report
                    .errors
                    .push(format!("Failed to purge backup '{}': {}", record.id, e));
            }
        }
    }

    manager.forget(&forgotten)?;
    tracing::info!(
        purged = report.purged.len(),
        bytes = report.total_bytes_freed,
        "backups purged"
    );
    Ok(report)
}
