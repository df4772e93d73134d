use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::scanner::item::Category;

/// Items between two progress snapshots inside a streaming provider
pub const DEFAULT_PROGRESS_BATCH: usize = 256;

/// Engine configuration, owned by the caller and handed to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root for backups, session manifests and logs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where backups go; defaults to `<data_dir>/backups`
    #[serde(default)]
    pub backup_root: Option<PathBuf>,

    /// Backups older than this are eligible for `purge_expired`
    #[serde(default = "default_retention_days")]
    pub backup_retention_days: u32,

    /// Streaming providers report progress once per this many items
    #[serde(default = "default_progress_batch")]
    pub progress_batch_size: usize,

    /// Items at or above this size are classified one tier higher
    #[serde(default = "default_large_item_mb")]
    pub large_item_mb: u64,

    /// Items modified within this window are classified one tier higher
    #[serde(default = "default_recent_window_hours")]
    pub recent_window_hours: u32,

    /// Compare duplicate members byte-for-byte before offering them for
    /// automatic removal
    #[serde(default = "default_true")]
    pub verify_duplicates_bytewise: bool,

    /// Chunk size for streaming hashes and overwrite passes
    #[serde(default = "default_chunk_size")]
    pub hash_chunk_size: usize,

    /// Paths to exclude from scanning (substring match)
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// File areas enumerated by the built-in area provider
    #[serde(default)]
    pub scan_areas: Vec<ScanArea>,
}

/// One configured file area: where to look and how to label what is found
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanArea {
    pub name: String,
    pub category: Category,
    /// Paths with `~` and glob expansion
    pub paths: Vec<String>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Only report files older than N days
    #[serde(default)]
    pub min_age_days: Option<u32>,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::env::temp_dir())
        .join(".sweepsafe")
}
fn default_retention_days() -> u32 {
    7
}
fn default_progress_batch() -> usize {
    DEFAULT_PROGRESS_BATCH
}
fn default_large_item_mb() -> u64 {
    500
}
fn default_recent_window_hours() -> u32 {
    24
}
fn default_true() -> bool {
    true
}
fn default_chunk_size() -> usize {
    64 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backup_root: None,
            backup_retention_days: default_retention_days(),
            progress_batch_size: default_progress_batch(),
            large_item_mb: default_large_item_mb(),
            recent_window_hours: default_recent_window_hours(),
            verify_duplicates_bytewise: true,
            hash_chunk_size: default_chunk_size(),
            exclude_paths: Vec::new(),
            scan_areas: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Config rooted at `data_dir`, everything else default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Default config file location (`<data_dir>/config.toml`)
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config.normalized())
    }

    /// Load config from file, or fall back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Create the data, backup, session and log directories
    pub fn init_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.data_dir.clone(),
            self.backup_dir(),
            self.sessions_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn large_item_bytes(&self) -> u64 {
        self.large_item_mb * 1024 * 1024
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.display().to_string();
        self.exclude_paths.iter().any(|p| path_str.contains(p))
    }

    /// Clamp values that would stall the engine
    fn normalized(mut self) -> Self {
        if self.progress_batch_size == 0 {
            self.progress_batch_size = default_progress_batch();
        }
        if self.hash_chunk_size == 0 {
            self.hash_chunk_size = default_chunk_size();
        }
        self
    }
}
