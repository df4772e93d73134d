use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::backup::BackupRecord;
use crate::common::errors::FailureReason;
use crate::scanner::item::{Category, Locator};
use crate::scanner::risk::RiskTier;

/// Audit record of one clean run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanManifest {
    /// Unique session identifier (timestamp-based)
    pub session_id: String,

    /// When the clean started
    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Whether the run was cancelled before the last item
    pub cancelled: bool,

    /// Total bytes freed
    pub total_bytes: u64,

    pub cleaned_count: usize,

    pub failed_count: usize,

    /// Set once `rollback_session` has restored the backups
    pub rolled_back: bool,

    /// One entry per processed item, in processing order
    pub items: Vec<ManifestItem>,
}

/// One processed item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestItem {
    pub locator: Locator,
    pub category: Category,
    pub risk: RiskTier,
    pub size_bytes: u64,
    pub success: bool,
    pub reason: Option<FailureReason>,
    /// Verified backup taken before the erase, if the tier required one
    pub backup: Option<BackupRecord>,
}

impl ManifestItem {
    /// Backed up, then the erase broke off partway. The original may still
    /// be on disk with some of its content already overwritten.
    pub fn damaged(&self) -> bool {
        !self.success && self.backup.is_some() && matches!(self.reason, Some(FailureReason::EraseFailed(_)))
    }
}

impl CleanManifest {
    pub fn new() -> Self {
        let now = Utc::now();
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..6];
        Self {
            session_id: format!("{}-{}", now.format("%Y-%m-%dT%H-%M-%S%.3f"), suffix),
            started_at: now,
            finished_at: None,
            cancelled: false,
            total_bytes: 0,
            cleaned_count: 0,
            failed_count: 0,
            rolled_back: false,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: ManifestItem) {
        if item.success {
            self.total_bytes += item.size_bytes;
            self.cleaned_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.items.push(item);
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Items a rollback would restore: every cleaned item with a verified
    /// backup, plus failed items whose erase got far enough to damage them
    pub fn restorable(&self) -> impl Iterator<Item = (&ManifestItem, &BackupRecord)> {
        self.items
            .iter()
            .filter(|i| i.success || i.damaged())
            .filter_map(|i| i.backup.as_ref().map(|b| (i, b)))
            .filter(|(_, b)| b.authorizes_destruction())
    }

    pub fn path_in(sessions_dir: &Path, session_id: &str) -> PathBuf {
        sessions_dir.join(format!("{}.json", session_id))
    }

    /// Write `<sessions_dir>/<id>.json` and append to the daily JSONL log
    pub fn save(&self, sessions_dir: &Path, logs_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(sessions_dir).with_context(|| {
            format!("Failed to create sessions dir: {}", sessions_dir.display())
        })?;
        let manifest_path = Self::path_in(sessions_dir, &self.session_id);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        std::fs::write(&manifest_path, &json)
            .with_context(|| format!("Failed to write manifest: {}", manifest_path.display()))?;

        // Append to the daily log file (JSONL format)
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs dir: {}", logs_dir.display()))?;
        let log_path = logs_dir.join(format!("clean-{}.jsonl", self.started_at.format("%Y-%m-%d")));
        let log_entry = serde_json::to_string(self).context("Failed to serialize log entry")?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log: {}", log_path.display()))?;
        writeln!(file, "{}", log_entry)?;

        Ok(())
    }

    pub fn load(sessions_dir: &Path, session_id: &str) -> Result<Self> {
        let manifest_path = Self::path_in(sessions_dir, session_id);
        if !manifest_path.exists() {
            anyhow::bail!("Session '{}' not found", session_id);
        }
        let contents = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest: {}", manifest_path.display()))
    }

    /// All sessions, most recent first. Unreadable manifests are skipped.
    pub fn list_sessions(sessions_dir: &Path) -> Result<Vec<SessionSummary>> {
        if !sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(sessions_dir)
            .with_context(|| format!("Failed to read sessions dir: {}", sessions_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(manifest) = serde_json::from_str::<CleanManifest>(&contents) {
                sessions.push(SessionSummary {
                    restorable: manifest.restorable().count(),
                    session_id: manifest.session_id,
                    started_at: manifest.started_at,
                    total_bytes: manifest.total_bytes,
                    cleaned_count: manifest.cleaned_count,
                    failed_count: manifest.failed_count,
                    cancelled: manifest.cancelled,
                    rolled_back: manifest.rolled_back,
                });
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }
}

impl Default for CleanManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary info about a session (for listing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub total_bytes: u64,
    pub cleaned_count: usize,
    pub failed_count: usize,
    pub cancelled: bool,
    pub rolled_back: bool,
    pub restorable: usize,
}
