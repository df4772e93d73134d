use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::common::errors::{BackupError, RestoreError};
use crate::duplicates::hasher;
use crate::scanner::item::{Category, CleanableItem, Domain, Locator};
use crate::scanner::provider::EntryStore;

/// Name of the append-only record index inside the backup root
pub const INDEX_FILE: &str = "index.jsonl";

/// A hash-verified copy of an item, made before it is destroyed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Unique suffix of the backup name
    pub id: String,
    pub source: Locator,
    /// `<backup_root>/<category>_<timestamp>_<id>`
    pub backup_path: PathBuf,
    pub category: Category,
    pub size_bytes: u64,
    pub is_dir: bool,
    pub source_hash: String,
    pub backup_hash: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    /// Only a verified, hash-matching record may authorize destruction
    pub fn authorizes_destruction(&self) -> bool {
        self.verified && self.source_hash == self.backup_hash
    }
}

/// Creates and restores backups. The orchestrator talks to this seam so
/// hosts can substitute their own storage.
pub trait BackupStore: Send + Sync {
    fn backup(&self, item: &CleanableItem) -> Result<BackupRecord, BackupError>;
    fn restore(&self, record: &BackupRecord) -> Result<(), RestoreError>;
}

/// Filesystem backup store rooted at one directory
pub struct BackupManager {
    root: PathBuf,
    chunk_size: usize,
    entry_stores: HashMap<Domain, Arc<dyn EntryStore>>,
    index_lock: Mutex<()>,
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("root", &self.root)
            .field("chunk_size", &self.chunk_size)
            .field("entry_domains", &self.entry_stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: hasher::DEFAULT_CHUNK_SIZE,
            entry_stores: HashMap::new(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Route `Locator::Entry` items of the store's domain through it
    pub fn with_entry_store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.entry_stores.insert(store.domain(), store);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Unique destination: `<category>_<ISO 8601 basic timestamp>_<id>`
    fn destination(&self, category: Category, now: DateTime<Utc>) -> (String, PathBuf) {
        let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let name = format!(
            "{}_{}_{}",
            category.slug(),
            now.format("%Y%m%dT%H%M%S%.3fZ"),
            id
        );
        (id, self.root.join(name))
    }

    fn backup_path_item(
        &self,
        item: &CleanableItem,
        source: &Path,
    ) -> Result<BackupRecord, BackupError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| BackupError::Io { path, source }
        };

        let meta = std::fs::symlink_metadata(source).map_err(io_err(source))?;
        std::fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;

        let now = Utc::now();
        let (id, dest) = self.destination(item.category, now);

        if meta.is_dir() {
            if let Err(e) = copy_dir_recursive(source, &dest) {
                let _ = std::fs::remove_dir_all(&dest);
                return Err(BackupError::Io {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        } else {
            std::fs::copy(source, &dest).map_err(io_err(source))?;
        }

        let source_hash = match hasher::content_hash(source, self.chunk_size) {
            Ok(h) => h,
            Err(e) => {
                remove_path(&dest);
                return Err(BackupError::Io {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        };
        let backup_hash = match hasher::content_hash(&dest, self.chunk_size) {
            Ok(h) => h,
            Err(e) => {
                remove_path(&dest);
                return Err(BackupError::Io { path: dest, source: e });
            }
        };

        let size_bytes = if meta.is_dir() {
            crate::scanner::walker::dir_size(source)
        } else {
            meta.len()
        };

        self.finalize(BackupRecord {
            id,
            source: item.locator.clone(),
            backup_path: dest,
            category: item.category,
            size_bytes,
            is_dir: meta.is_dir(),
            source_hash,
            backup_hash,
            verified: false,
            created_at: now,
        })
    }

    fn backup_entry_item(
        &self,
        item: &CleanableItem,
        key: &str,
    ) -> Result<BackupRecord, BackupError> {
        let store = self
            .entry_stores
            .get(&item.category.domain())
            .ok_or_else(|| BackupError::NoEntryStore {
                locator: key.to_string(),
            })?;

        let data = store.export(key).map_err(|message| BackupError::EntryStore {
            locator: key.to_string(),
            message,
        })?;

        std::fs::create_dir_all(&self.root).map_err(|source| BackupError::Io {
            path: self.root.clone(),
            source,
        })?;
        let now = Utc::now();
        let (id, dest) = self.destination(item.category, now);
        std::fs::write(&dest, &data).map_err(|source| BackupError::Io {
            path: dest.clone(),
            source,
        })?;

        let source_hash = hasher::hash_bytes(&data);
        let backup_hash = match hasher::full_hash(&dest, self.chunk_size) {
            Ok(h) => h,
            Err(e) => {
                remove_path(&dest);
                return Err(BackupError::Io {
                    path: e.path,
                    source: e.source,
                });
            }
        };

        self.finalize(BackupRecord {
            id,
            source: item.locator.clone(),
            backup_path: dest,
            category: item.category,
            size_bytes: data.len() as u64,
            is_dir: false,
            source_hash,
            backup_hash,
            verified: false,
            created_at: now,
        })
    }

    /// Compare hashes; a mismatching copy is deleted on the spot and never
    /// recorded.
    fn finalize(&self, mut record: BackupRecord) -> Result<BackupRecord, BackupError> {
        if record.source_hash != record.backup_hash {
            tracing::warn!(
                source = %record.source,
                backup = %record.backup_path.display(),
                "backup verification failed, discarding copy"
            );
            remove_path(&record.backup_path);
            return Err(BackupError::VerificationFailed {
                locator: record.source.to_string(),
                source_hash: record.source_hash,
                backup_hash: record.backup_hash,
            });
        }

        record.verified = true;
        self.append_index(&record)
            .map_err(|source| BackupError::Io {
                path: self.index_path(),
                source,
            })?;
        tracing::debug!(source = %record.source, id = %record.id, "backup verified");
        Ok(record)
    }

    fn append_index(&self, record: &BackupRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let _guard = self.index_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_path())?;
        writeln!(file, "{}", line)
    }

    /// Every record in the index, oldest first. Malformed lines are skipped.
    pub fn list_records(&self) -> std::io::Result<Vec<BackupRecord>> {
        let _guard = self.index_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read_index()
    }

    /// Caller holds `index_lock`
    fn read_index(&self) -> std::io::Result<Vec<BackupRecord>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<BackupRecord>(line) {
                Ok(r) => records.push(r),
                Err(e) => tracing::warn!(error = %e, "skipping malformed backup index line"),
            }
        }
        Ok(records)
    }

    pub fn find_record(&self, id: &str) -> std::io::Result<Option<BackupRecord>> {
        Ok(self.list_records()?.into_iter().find(|r| r.id == id))
    }

    /// Drop records from the index (the backups themselves are untouched)
    pub(crate) fn forget(&self, ids: &[String]) -> std::io::Result<()> {
        // held across read and rewrite so a concurrent append is never lost
        let _guard = self.index_lock.lock().unwrap_or_else(|p| p.into_inner());
        let kept: Vec<String> = self
            .read_index()?
            .iter()
            .filter(|r| !ids.contains(&r.id))
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect();

        let tmp = self.root.join(format!("{}.tmp", INDEX_FILE));
        let mut body = kept.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, self.index_path())
    }

    fn restore_path_item(&self, record: &BackupRecord, dest: &Path) -> Result<(), RestoreError> {
        if dest.exists() {
            return Err(RestoreError::DestinationExists {
                path: dest.to_path_buf(),
            });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RestoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let copied = if record.is_dir {
            copy_dir_recursive(&record.backup_path, dest)
        } else {
            std::fs::copy(&record.backup_path, dest).map(|_| ())
        };
        if let Err(source) = copied {
            remove_path(dest);
            return Err(RestoreError::Io {
                path: dest.to_path_buf(),
                source,
            });
        }

        let actual = match hasher::content_hash(dest, self.chunk_size) {
            Ok(h) => h,
            Err(source) => {
                remove_path(dest);
                return Err(RestoreError::Io {
                    path: dest.to_path_buf(),
                    source,
                });
            }
        };
        if actual != record.source_hash {
            remove_path(dest);
            return Err(RestoreError::VerificationFailed {
                locator: record.source.to_string(),
                expected: record.source_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn restore_entry_item(&self, record: &BackupRecord, key: &str) -> Result<(), RestoreError> {
        let store = self
            .entry_stores
            .get(&record.category.domain())
            .ok_or_else(|| RestoreError::EntryStore {
                locator: key.to_string(),
                message: "no entry store registered".into(),
            })?;

        let data = std::fs::read(&record.backup_path).map_err(|source| RestoreError::Io {
            path: record.backup_path.clone(),
            source,
        })?;
        let actual = hasher::hash_bytes(&data);
        if actual != record.source_hash {
            return Err(RestoreError::VerificationFailed {
                locator: key.to_string(),
                expected: record.source_hash.clone(),
                actual,
            });
        }

        store.import(key, &data).map_err(|message| RestoreError::EntryStore {
            locator: key.to_string(),
            message,
        })
    }
}

impl BackupStore for BackupManager {
    fn backup(&self, item: &CleanableItem) -> Result<BackupRecord, BackupError> {
        match &item.locator {
            Locator::Path(source) => self.backup_path_item(item, source),
            Locator::Entry(key) => self.backup_entry_item(item, key),
        }
    }

    /// Inverse copy back to the original locator, hash-verified afterwards.
    /// The backup itself is kept.
    fn restore(&self, record: &BackupRecord) -> Result<(), RestoreError> {
        if !record.authorizes_destruction() {
            return Err(RestoreError::Unverified {
                locator: record.source.to_string(),
            });
        }
        if !record.backup_path.exists() {
            return Err(RestoreError::BackupMissing {
                path: record.backup_path.clone(),
            });
        }

        match &record.source {
            Locator::Path(dest) => self.restore_path_item(record, dest),
            Locator::Entry(key) => self.restore_entry_item(record, key),
        }
    }
}

/// Recursively copy a directory, preserving symlinks as links
pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot copy symlink '{}'", src.display()),
    ))
}

/// Move a damaged original out of the way so a restore can recreate it.
/// Returns the new location, or `None` when there was nothing to move.
pub(crate) fn set_aside(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let aside = path.with_file_name(format!(".{}.damaged-{}", name, short));
    std::fs::rename(path, &aside)?;
    Ok(Some(aside))
}

/// Best-effort removal of a file or tree we created ourselves
pub(crate) fn remove_path(path: &Path) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary copy");
    }
}
