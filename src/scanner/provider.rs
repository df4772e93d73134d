use std::collections::BTreeSet;
use std::path::PathBuf;

use super::item::{CleanableItem, Domain};
use crate::common::config::{EngineConfig, DEFAULT_PROGRESS_BATCH};
use crate::common::errors::ProviderScanError;
use crate::engine::cancel::CancelToken;
use crate::engine::progress::ProgressSink;

/// Options for one scan pass
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Provider names to run; `None` runs every registered provider
    pub providers: Option<BTreeSet<String>>,

    /// Run duplicate detection over file-domain items
    pub detect_duplicates: bool,

    /// Restrict duplicate detection to items under this root
    pub duplicate_scope: Option<PathBuf>,

    /// Ignore files smaller than this (bytes)
    pub min_file_size: u64,

    /// Report progress every N items inside a streaming provider
    pub progress_batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            providers: None,
            detect_duplicates: false,
            duplicate_scope: None,
            min_file_size: 0,
            progress_batch_size: DEFAULT_PROGRESS_BATCH,
        }
    }
}

impl ScanOptions {
    /// Defaults with the configured progress batch size
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            progress_batch_size: config.progress_batch_size.max(1),
            ..Self::default()
        }
    }

    pub fn with_duplicates(mut self) -> Self {
        self.detect_duplicates = true;
        self
    }

    pub fn only(mut self, providers: &[&str]) -> Self {
        self.providers = Some(providers.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn is_enabled(&self, provider: &str) -> bool {
        self.providers
            .as_ref()
            .map(|set| set.contains(provider))
            .unwrap_or(true)
    }
}

/// What a provider hands back: its items plus swallowed per-item failures
#[derive(Debug, Default)]
pub struct ProviderOutput {
    pub items: Vec<CleanableItem>,
    pub warnings: Vec<String>,
}

/// Enumerates candidate items for one resource domain.
///
/// Implementations do their work sequentially on the calling thread, poll
/// `cancel` between items and swallow per-item failures into
/// `ProviderOutput::warnings`. Returning `Err` marks the whole provider as
/// failed; any partial items travel inside the error.
pub trait ScanProvider: Send + Sync {
    fn name(&self) -> &str;

    fn scan(
        &self,
        options: &ScanOptions,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ProviderOutput, ProviderScanError>;
}

/// Backing store for items that are not files (registry keys, startup
/// entries). The engine never interprets the bytes.
pub trait EntryStore: Send + Sync {
    fn domain(&self) -> Domain;

    /// Serialize the entry so it can be restored later
    fn export(&self, key: &str) -> Result<Vec<u8>, String>;

    /// Recreate an entry from `export` output
    fn import(&self, key: &str, data: &[u8]) -> Result<(), String>;

    fn remove(&self, key: &str) -> Result<(), String>;
}
