use std::path::PathBuf;

use thiserror::Error;

use crate::engine::state::EngineState;
use crate::scanner::item::CleanableItem;

/// Errors surfaced past the batch boundary.
///
/// Per-item failures never show up here: they are collected into the scan
/// warnings or the `CleaningResult`. What remains is state-machine misuse and
/// setup failures that prevent a run from starting at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A scan or clean was requested while another operation was active
    #[error("cannot start {requested} while the engine is {current}")]
    StateConflict {
        current: EngineState,
        requested: &'static str,
    },

    /// Setting up engine directories failed
    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The audit manifest could not be written or read
    #[error("manifest error: {message}")]
    Manifest { message: String },

    /// A background worker panicked before producing a result
    #[error("background worker for {operation} panicked")]
    WorkerPanicked { operation: &'static str },
}

/// One provider failed to finish its enumeration.
///
/// Non-fatal: the orchestrator logs it and keeps `partial`.
#[derive(Debug, Error)]
#[error("provider '{provider}' failed: {message}")]
pub struct ProviderScanError {
    pub provider: String,
    pub message: String,
    pub partial: Vec<CleanableItem>,
}

impl ProviderScanError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            partial: Vec::new(),
        }
    }

    pub fn with_partial(mut self, partial: Vec<CleanableItem>) -> Self {
        self.partial = partial;
        self
    }
}

/// A candidate could not be hashed
#[derive(Debug, Error)]
#[error("hash error for '{}': {source}", .path.display())]
pub struct HashError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source and copy hashes differ. The copy has already been removed.
    #[error("backup verification failed for '{locator}': source {source_hash}, backup {backup_hash}")]
    VerificationFailed {
        locator: String,
        source_hash: String,
        backup_hash: String,
    },

    #[error("no entry store registered for '{locator}'")]
    NoEntryStore { locator: String },

    #[error("entry store failed for '{locator}': {message}")]
    EntryStore { locator: String, message: String },
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("restore I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup '{}' no longer exists", .path.display())]
    BackupMissing { path: PathBuf },

    #[error("refusing to overwrite existing '{}'", .path.display())]
    DestinationExists { path: PathBuf },

    /// The restored copy did not match the recorded hash. It has been removed.
    #[error("restore verification failed for '{locator}': expected {expected}, got {actual}")]
    VerificationFailed {
        locator: String,
        expected: String,
        actual: String,
    },

    #[error("restore refused: backup of '{locator}' was never verified")]
    Unverified { locator: String },

    #[error("entry store failed for '{locator}': {message}")]
    EntryStore { locator: String, message: String },
}

#[derive(Debug, Error)]
pub enum EraseError {
    #[error("erase I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O broke down mid-overwrite; remaining passes were abandoned
    #[error("overwrite pass {pass} aborted at '{}': {source}", .path.display())]
    Overwrite {
        path: PathBuf,
        pass: usize,
        #[source]
        source: std::io::Error,
    },

    /// Some entries inside a directory-shaped item survived
    #[error("{failed} of {total} entries under '{}' could not be removed (first: {first})", .path.display())]
    Incomplete {
        path: PathBuf,
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("refusing to erase protected path '{}'", .path.display())]
    Protected { path: PathBuf },

    #[error("no entry store registered for '{locator}'")]
    NoEntryStore { locator: String },

    #[error("entry store failed for '{locator}': {message}")]
    EntryStore { locator: String, message: String },
}

/// Why an item ended up in `CleaningResult::failed`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Backup copy did not hash-match its source; the original was left alone
    BackupVerificationFailed,
    /// Backup could not be created at all
    BackupFailed(String),
    /// Deletion or overwrite failed
    EraseFailed(String),
    /// Path is on the never-delete list
    ProtectedPath,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::BackupVerificationFailed => write!(f, "BackupVerificationFailed"),
            FailureReason::BackupFailed(cause) => write!(f, "BackupFailed: {}", cause),
            FailureReason::EraseFailed(cause) => write!(f, "EraseFailed: {}", cause),
            FailureReason::ProtectedPath => write!(f, "ProtectedPath"),
        }
    }
}

impl From<&BackupError> for FailureReason {
    fn from(e: &BackupError) -> Self {
        match e {
            BackupError::VerificationFailed { .. } => FailureReason::BackupVerificationFailed,
            other => FailureReason::BackupFailed(other.to_string()),
        }
    }
}

impl From<&EraseError> for FailureReason {
    fn from(e: &EraseError) -> Self {
        match e {
            EraseError::Protected { .. } => FailureReason::ProtectedPath,
            other => FailureReason::EraseFailed(other.to_string()),
        }
    }
}
