use chrono::Utc;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use super::cancel::CancelToken;
use super::progress::{Progress, ProgressSink};
use super::selection::Selection;
use super::state::{EngineState, RunGuard, RunOutcome, StateCell};
use crate::cleaner::backup::{self, BackupManager, BackupRecord, BackupStore};
use crate::cleaner::eraser::{Eraser, SecureEraser};
use crate::cleaner::manifest::{CleanManifest, ManifestItem, SessionSummary};
use crate::cleaner::purger::{self, PurgeReport};
use crate::common::config::EngineConfig;
use crate::common::errors::{EngineError, FailureReason};
use crate::common::{format, safety};
use crate::duplicates::grouper;
use crate::duplicates::resolver::ResolvedDuplicates;
use crate::scanner::item::{CleanableItem, Locator, ScanResult};
use crate::scanner::provider::{EntryStore, ScanOptions, ScanProvider};
use crate::scanner::risk::{base_tier, RiskClassifier};
use crate::scanner::walker::AreaProvider;

/// An item that survived the clean phase
#[derive(Debug, Clone)]
pub struct FailedItem {
    pub item: CleanableItem,
    pub reason: FailureReason,
    /// Verified backup taken before the failed erase, if any
    pub backup: Option<BackupRecord>,
}

/// Aggregate of one clean run
#[derive(Debug, Clone, Default)]
pub struct CleaningResult {
    pub cleaned: Vec<CleanableItem>,
    pub failed: Vec<FailedItem>,
    /// Sum of `size_bytes` over `cleaned`
    pub total_size_freed: u64,
    /// Every verified backup made during the run
    pub backups: Vec<BackupRecord>,
    /// Manifest id, when the manifest could be written
    pub session_id: Option<String>,
}

impl CleaningResult {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record_cleaned(&mut self, item: CleanableItem) {
        self.total_size_freed += item.size_bytes;
        self.cleaned.push(item);
    }
}

/// Outcome of restoring one session's backups
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub session_id: String,
    pub restored: Vec<Locator>,
    pub failed: Vec<(Locator, String)>,
}

/// Handle to a scan or clean running on a background thread
pub struct Job<T> {
    handle: JoinHandle<Result<RunOutcome<T>, EngineError>>,
    operation: &'static str,
}

impl<T> Job<T> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the run ends
    pub fn join(self) -> Result<RunOutcome<T>, EngineError> {
        self.handle
            .join()
            .unwrap_or(Err(EngineError::WorkerPanicked {
                operation: self.operation,
            }))
    }
}

pub struct OrchestratorBuilder {
    config: EngineConfig,
    providers: Vec<Arc<dyn ScanProvider>>,
    entry_stores: Vec<Arc<dyn EntryStore>>,
    backup_store: Option<Arc<dyn BackupStore>>,
    eraser: Option<Arc<dyn Eraser>>,
    classifier: Option<RiskClassifier>,
}

impl OrchestratorBuilder {
    /// Register the built-in provider over `config.scan_areas`
    pub fn area_provider(self) -> Self {
        let provider = AreaProvider::from_config(&self.config);
        self.provider(provider)
    }

    pub fn provider<P: ScanProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Route `Locator::Entry` items of the store's domain through it
    pub fn entry_store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.entry_stores.push(store);
        self
    }

    /// Replace the filesystem backup manager
    pub fn backup_store(mut self, store: Arc<dyn BackupStore>) -> Self {
        self.backup_store = Some(store);
        self
    }

    /// Replace the secure eraser. Registered entry stores are not handed to
    /// a custom eraser.
    pub fn eraser(mut self, eraser: Arc<dyn Eraser>) -> Self {
        self.eraser = Some(eraser);
        self
    }

    pub fn classifier(mut self, classifier: RiskClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn build(self) -> Orchestrator {
        let chunk = self.config.hash_chunk_size;

        let backups = self.backup_store.unwrap_or_else(|| {
            let mut manager = BackupManager::new(self.config.backup_dir()).with_chunk_size(chunk);
            for store in &self.entry_stores {
                manager = manager.with_entry_store(Arc::clone(store));
            }
            Arc::new(manager)
        });

        let eraser = self.eraser.unwrap_or_else(|| {
            let mut eraser = SecureEraser::new().with_chunk_size(chunk);
            for store in &self.entry_stores {
                eraser = eraser.with_entry_store(Arc::clone(store));
            }
            Arc::new(eraser)
        });

        tracing::debug!(
            providers = self.providers.len(),
            entry_stores = self.entry_stores.len(),
            "orchestrator built"
        );

        Orchestrator {
            inner: Arc::new(Inner {
                classifier: self
                    .classifier
                    .unwrap_or_else(|| RiskClassifier::from_config(&self.config)),
                config: self.config,
                providers: self.providers,
                backups,
                eraser,
                state: Arc::new(StateCell::new()),
                cancel: Mutex::new(CancelToken::new()),
            }),
        }
    }
}

/// Coordinates scan and clean phases.
///
/// Cheap to clone; clones share state, so a clone handed to another thread
/// can `cancel()` the active run.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    providers: Vec<Arc<dyn ScanProvider>>,
    classifier: RiskClassifier,
    backups: Arc<dyn BackupStore>,
    eraser: Arc<dyn Eraser>,
    state: Arc<StateCell>,
    cancel: Mutex<CancelToken>,
}

/// Everything a single run owns
struct Run {
    guard: RunGuard,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn builder(config: EngineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            providers: Vec::new(),
            entry_stores: Vec::new(),
            backup_store: None,
            eraser: None,
            classifier: None,
        }
    }

    /// Orchestrator over the configured scan areas with default collaborators
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).area_provider().build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn state(&self) -> EngineState {
        self.inner.state.get()
    }

    /// Signal the active run to stop at its next item or provider boundary
    pub fn cancel(&self) {
        let token = self.inner.cancel.lock().unwrap_or_else(|p| p.into_inner());
        tracing::info!(state = %self.state(), "cancellation requested");
        token.cancel();
    }

    /// Run a scan on the calling thread
    pub fn scan(
        &self,
        options: &ScanOptions,
        progress: &dyn ProgressSink,
    ) -> Result<RunOutcome<ScanResult>, EngineError> {
        let run = self.inner.begin(EngineState::Scanning, "scan")?;
        Ok(self.inner.scan(run, options, progress))
    }

    /// Run a clean on the calling thread
    pub fn clean(
        &self,
        items: Vec<CleanableItem>,
        progress: &dyn ProgressSink,
    ) -> Result<RunOutcome<CleaningResult>, EngineError> {
        let run = self.inner.begin(EngineState::Cleaning, "clean")?;
        self.inner.clean(run, items, progress)
    }

    /// Start a scan on a worker thread. A busy engine rejects the request
    /// here, before anything is spawned.
    pub fn start_scan(
        &self,
        options: ScanOptions,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Job<ScanResult>, EngineError> {
        let run = self.inner.begin(EngineState::Scanning, "scan")?;
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || Ok(inner.scan(run, &options, progress.as_ref())));
        Ok(Job {
            handle,
            operation: "scan",
        })
    }

    /// Start a clean on a worker thread
    pub fn start_clean(
        &self,
        items: Vec<CleanableItem>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Job<CleaningResult>, EngineError> {
        let run = self.inner.begin(EngineState::Cleaning, "clean")?;
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || inner.clean(run, items, progress.as_ref()));
        Ok(Job {
            handle,
            operation: "clean",
        })
    }

    /// Past clean sessions, most recent first
    pub fn sessions(&self) -> Result<Vec<SessionSummary>, EngineError> {
        CleanManifest::list_sessions(&self.inner.config.sessions_dir()).map_err(|e| {
            EngineError::Manifest {
                message: format!("{:#}", e),
            }
        })
    }

    /// Restore every verified backup taken during one clean session,
    /// including items whose erase failed partway through
    pub fn rollback_session(&self, session_id: &str) -> Result<RestoreReport, EngineError> {
        let guard = self.inner.state.begin(EngineState::Restoring, "rollback")?;
        let previous = guard.previous();
        let report = self.inner.rollback(session_id);
        guard.finish(previous);
        report
    }

    /// Delete backups older than `backup_retention_days`. Never runs on its
    /// own; the host decides when.
    pub fn purge_expired_backups(&self) -> Result<PurgeReport, EngineError> {
        let guard = self.inner.state.begin(EngineState::Purging, "purge")?;
        let previous = guard.previous();
        let config = &self.inner.config;
        let manager = BackupManager::new(config.backup_dir()).with_chunk_size(config.hash_chunk_size);
        let report = purger::purge_expired(&manager, config.backup_retention_days).map_err(|source| {
            EngineError::Io {
                path: config.backup_dir(),
                source,
            }
        });
        guard.finish(previous);
        report
    }

    /// Add every redundant duplicate in `result` to `selection`, verified
    /// byte-for-byte first when `verify_duplicates_bytewise` is set
    pub fn select_duplicates(&self, selection: &mut Selection, result: &ScanResult) -> ResolvedDuplicates {
        let config = &self.inner.config;
        selection.select_redundant_duplicates(
            &result.duplicates,
            config.verify_duplicates_bytewise,
            config.hash_chunk_size,
        )
    }
}

impl Inner {
    fn begin(&self, target: EngineState, requested: &'static str) -> Result<Run, EngineError> {
        let guard = self.state.begin(target, requested)?;
        let cancel = CancelToken::new();
        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = cancel.clone();
        Ok(Run { guard, cancel })
    }

    fn rollback(&self, session_id: &str) -> Result<RestoreReport, EngineError> {
        let sessions_dir = self.config.sessions_dir();
        let manifest_err = |e: anyhow::Error| EngineError::Manifest {
            message: format!("{:#}", e),
        };
        let mut manifest = CleanManifest::load(&sessions_dir, session_id).map_err(manifest_err)?;

        let mut report = RestoreReport {
            session_id: session_id.to_string(),
            ..Default::default()
        };
        for (item, record) in manifest.restorable() {
            match self.restore_one(item, record) {
                Ok(()) => {
                    tracing::debug!(source = %record.source, damaged = item.damaged(), "restored");
                    report.restored.push(record.source.clone());
                }
                Err(e) => {
                    tracing::warn!(source = %record.source, error = %e, "restore failed");
                    report.failed.push((record.source.clone(), e));
                }
            }
        }

        manifest.rolled_back = report.failed.is_empty();
        manifest
            .save(&sessions_dir, &self.config.logs_dir())
            .map_err(manifest_err)?;

        tracing::info!(
            session = session_id,
            restored = report.restored.len(),
            failed = report.failed.len(),
            "session rolled back"
        );
        Ok(report)
    }

    /// A damaged original is moved aside first and only discarded once the
    /// backup is back in place
    fn restore_one(&self, item: &ManifestItem, record: &BackupRecord) -> Result<(), String> {
        let aside = match &record.source {
            Locator::Path(path) if item.damaged() => backup::set_aside(path).map_err(|e| {
                format!("cannot move damaged '{}' aside: {}", path.display(), e)
            })?,
            _ => None,
        };

        match self.backups.restore(record) {
            Ok(()) => {
                if let Some(aside) = aside {
                    backup::remove_path(&aside);
                }
                Ok(())
            }
            Err(e) => {
                if let (Some(aside), Locator::Path(path)) = (aside, &record.source) {
                    if let Err(put_back) = std::fs::rename(&aside, path) {
                        tracing::warn!(
                            path = %path.display(),
                            aside = %aside.display(),
                            error = %put_back,
                            "could not put damaged original back"
                        );
                    }
                }
                Err(e.to_string())
            }
        }
    }

    fn scan(&self, run: Run, options: &ScanOptions, progress: &dyn ProgressSink) -> RunOutcome<ScanResult> {
        let start = Instant::now();
        let cancel = &run.cancel;
        let mut result = ScanResult::new(Utc::now());

        let enabled: Vec<&Arc<dyn ScanProvider>> = self
            .providers
            .iter()
            .filter(|p| options.is_enabled(p.name()))
            .collect();
        let total = enabled.len();
        let completed = AtomicUsize::new(0);
        let aggregate: Mutex<(Vec<CleanableItem>, Vec<String>)> =
            Mutex::new((Vec::new(), Vec::new()));

        tracing::info!(providers = total, "scan started");
        progress.emit(Progress::Scan {
            step: 0,
            total,
            label: "Starting scan".to_string(),
        });

        // ── Fan out over providers ───────────────────────────────────────
        enabled.par_iter().for_each(|provider| {
            if cancel.is_cancelled() {
                return;
            }
            let name = provider.name();
            let relay = ProviderProgress {
                inner: progress,
                provider: name,
                completed: &completed,
                total,
            };

            let (items, warnings) = match provider.scan(options, &relay, cancel) {
                Ok(output) => (output.items, output.warnings),
                Err(e) => {
                    tracing::warn!(provider = name, error = %e.message, kept = e.partial.len(), "provider failed");
                    let warning = e.to_string();
                    (e.partial, vec![warning])
                }
            };
            tracing::debug!(provider = name, items = items.len(), "provider finished");

            {
                let mut agg = aggregate.lock().unwrap_or_else(|p| p.into_inner());
                agg.0.extend(items);
                agg.1.extend(warnings);
            }

            let step = completed.fetch_add(1, Ordering::SeqCst) + 1;
            progress.emit(Progress::Scan {
                step,
                total,
                label: format!("Scanned {}", name),
            });
        });

        let (mut items, warnings) = aggregate.into_inner().unwrap_or_else(|p| p.into_inner());
        result.warnings = warnings;
        if options.min_file_size > 0 {
            items.retain(|i| i.size_bytes >= options.min_file_size);
        }

        // ── Classify ─────────────────────────────────────────────────────
        self.classifier.annotate(&mut items, result.timestamp);

        // ── Duplicates ───────────────────────────────────────────────────
        if options.detect_duplicates && !cancel.is_cancelled() {
            progress.emit(Progress::Scan {
                step: total,
                total,
                label: "Finding duplicates".to_string(),
            });
            let report = grouper::find_duplicates(
                options.duplicate_scope.as_deref(),
                &items,
                self.config.hash_chunk_size,
            );
            result.warnings.extend(report.warnings);
            result.duplicates = report.groups;
        }

        items.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        result.items = items;
        result.recalculate();
        result.duration_secs = start.elapsed().as_secs_f64();

        let cancelled = cancel.is_cancelled();
        progress.emit(Progress::Finished {
            label: format!(
                "{}: {} items, {} in {}",
                if cancelled { "Scan cancelled" } else { "Scan complete" },
                result.items.len(),
                format::format_size(result.total_size),
                format::format_duration(result.duration_secs)
            ),
        });
        tracing::info!(
            items = result.items.len(),
            bytes = result.total_size,
            duplicate_groups = result.duplicates.len(),
            warnings = result.warnings.len(),
            cancelled,
            "scan finished"
        );

        if cancelled {
            run.guard.finish(EngineState::Cancelled);
            RunOutcome::Cancelled(result)
        } else {
            run.guard.finish(EngineState::Scanned);
            RunOutcome::Completed(result)
        }
    }

    fn clean(
        &self,
        run: Run,
        mut items: Vec<CleanableItem>,
        progress: &dyn ProgressSink,
    ) -> Result<RunOutcome<CleaningResult>, EngineError> {
        self.config.init_dirs().map_err(|source| EngineError::Io {
            path: self.config.data_dir.clone(),
            source,
        })?;

        let total_bytes: u64 = items.iter().map(|i| i.size_bytes).sum();
        if let Err(warning) = safety::validate_batch(items.len(), total_bytes) {
            tracing::warn!("{}", warning);
        }

        // caller-built items never go below their category's base tier
        for item in items.iter_mut() {
            item.risk = item.risk.max(base_tier(item.category));
        }
        // cheapest deletions first; stable, so equal tiers keep caller order
        items.sort_by_key(|i| i.risk);

        let total = items.len();
        let mut result = CleaningResult::default();
        let mut manifest = CleanManifest::new();
        let mut cancelled = false;
        tracing::info!(items = total, bytes = total_bytes, session = %manifest.session_id, "clean started");

        for (index, item) in items.into_iter().enumerate() {
            if run.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let label = describe(&item);
            let (outcome, backup) = self.clean_item(&item);
            if let Some(record) = &backup {
                result.backups.push(record.clone());
            }

            manifest.add_item(ManifestItem {
                locator: item.locator.clone(),
                category: item.category,
                risk: item.risk,
                size_bytes: item.size_bytes,
                success: outcome.is_ok(),
                reason: outcome.as_ref().err().cloned(),
                backup: backup.clone(),
            });

            match outcome {
                Ok(()) => {
                    tracing::debug!(item = %item.locator, risk = %item.risk, "cleaned");
                    result.record_cleaned(item);
                }
                Err(reason) => {
                    tracing::warn!(item = %item.locator, %reason, "item not cleaned");
                    result.failed.push(FailedItem {
                        item,
                        reason,
                        backup,
                    });
                }
            }

            progress.emit(Progress::Clean {
                processed: index + 1,
                total,
                label,
            });
        }

        manifest.finish(cancelled);
        match manifest.save(&self.config.sessions_dir(), &self.config.logs_dir()) {
            Ok(()) => result.session_id = Some(manifest.session_id.clone()),
            Err(e) => tracing::warn!(error = ?e, "failed to write clean manifest"),
        }

        progress.emit(Progress::Finished {
            label: format!(
                "{}: {} cleaned, {} failed, {} freed",
                if cancelled { "Clean cancelled" } else { "Clean complete" },
                result.cleaned.len(),
                result.failed.len(),
                format::format_size(result.total_size_freed)
            ),
        });
        tracing::info!(
            cleaned = result.cleaned.len(),
            failed = result.failed.len(),
            freed = result.total_size_freed,
            cancelled,
            "clean finished"
        );

        if cancelled {
            run.guard.finish(EngineState::Cancelled);
            Ok(RunOutcome::Cancelled(result))
        } else {
            run.guard.finish(EngineState::Completed);
            Ok(RunOutcome::Completed(result))
        }
    }

    /// Back up when the tier demands it, then erase. Nothing is erased
    /// unless the backup verified.
    fn clean_item(&self, item: &CleanableItem) -> (Result<(), FailureReason>, Option<BackupRecord>) {
        if let Some(path) = item.path() {
            if safety::is_protected(path) {
                return (Err(FailureReason::ProtectedPath), None);
            }
        }

        let backup = if item.risk.requires_backup() {
            match self.backups.backup(item) {
                Ok(record) if record.authorizes_destruction() => Some(record),
                Ok(_) => return (Err(FailureReason::BackupVerificationFailed), None),
                Err(e) => return (Err(FailureReason::from(&e)), None),
            }
        } else {
            None
        };

        let erased = self
            .eraser
            .erase(item, item.risk)
            .map_err(|e| FailureReason::from(&e));
        (erased, backup)
    }
}

fn describe(item: &CleanableItem) -> String {
    match &item.locator {
        Locator::Path(path) => format::format_path(path),
        Locator::Entry(key) => key.clone(),
    }
}

/// Rewrites a provider's own progress into the scan's step/total frame
struct ProviderProgress<'a> {
    inner: &'a dyn ProgressSink,
    provider: &'a str,
    completed: &'a AtomicUsize,
    total: usize,
}

impl ProgressSink for ProviderProgress<'_> {
    fn emit(&self, progress: Progress) {
        // the final snapshot belongs to the orchestrator
        if progress.is_final() {
            return;
        }
        self.inner.emit(Progress::Scan {
            step: self.completed.load(Ordering::SeqCst),
            total: self.total,
            label: format!("{}: {}", self.provider, progress.label()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ProviderScanError;
    use crate::engine::progress::{LatestProgress, NoProgress};
    use crate::scanner::item::Category;
    use crate::scanner::provider::ProviderOutput;
    use crate::scanner::risk::RiskTier;

    struct Fixed(Vec<CleanableItem>);

    impl ScanProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn scan(
            &self,
            _options: &ScanOptions,
            _progress: &dyn ProgressSink,
            _cancel: &CancelToken,
        ) -> Result<ProviderOutput, ProviderScanError> {
            Ok(ProviderOutput {
                items: self.0.clone(),
                warnings: Vec::new(),
            })
        }
    }

    fn engine(dir: &std::path::Path) -> Orchestrator {
        Orchestrator::builder(EngineConfig::with_data_dir(dir.join("data"))).build()
    }

    #[test]
    fn test_scan_classifies_and_sorts() {
        let dir = tempfile::TempDir::new().unwrap();
        let items = vec![
            CleanableItem::new(dir.path().join("small"), 10, Category::TempFile),
            CleanableItem::new(dir.path().join("big"), 1000, Category::BrowserCookies),
        ];
        let orch = Orchestrator::builder(EngineConfig::with_data_dir(dir.path()))
            .provider(Fixed(items))
            .build();

        let sink = LatestProgress::new();
        let result = orch.scan(&ScanOptions::default(), &sink).unwrap().into_inner();

        assert_eq!(result.items[0].size_bytes, 1000, "largest first");
        assert_eq!(result.items[0].risk, RiskTier::High);
        assert_eq!(result.items[1].risk, RiskTier::Safe);
        assert_eq!(result.total_size, 1010);
        assert_eq!(orch.state(), EngineState::Scanned);
        assert!(sink.latest().unwrap().is_final());
    }

    #[test]
    fn test_safe_item_is_not_backed_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("junk.tmp");
        std::fs::write(&file, "junk").unwrap();

        let orch = engine(dir.path());
        let result = orch
            .clean(
                vec![CleanableItem::new(file.clone(), 4, Category::TempFile)],
                &NoProgress,
            )
            .unwrap()
            .into_inner();

        assert!(result.success());
        assert!(result.backups.is_empty());
        assert!(!file.exists());
        assert_eq!(orch.state(), EngineState::Completed);
    }

    #[test]
    fn test_medium_item_backed_up_before_erase() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("history.db");
        std::fs::write(&file, "visited").unwrap();

        let mut item = CleanableItem::new(file.clone(), 7, Category::BrowserHistory);
        item.risk = RiskTier::Medium;

        let orch = engine(dir.path());
        let result = orch.clean(vec![item], &NoProgress).unwrap().into_inner();

        assert_eq!(result.cleaned.len(), 1);
        assert_eq!(result.backups.len(), 1);
        assert!(result.backups[0].authorizes_destruction());
        assert!(result.backups[0].backup_path.exists());
        assert!(!file.exists());
    }

    #[test]
    fn test_protected_path_fails_without_touching() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = engine(dir.path());
        let item = CleanableItem::new(std::path::PathBuf::from("/"), 0, Category::Other).as_dir();

        let result = orch.clean(vec![item], &NoProgress).unwrap().into_inner();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].reason, FailureReason::ProtectedPath);
    }

    #[test]
    fn test_rollback_restores_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("cookies.sqlite");
        std::fs::write(&file, "sid=42").unwrap();

        let mut item = CleanableItem::new(file.clone(), 6, Category::BrowserCookies);
        item.risk = RiskTier::High;

        let orch = engine(dir.path());
        let result = orch.clean(vec![item], &NoProgress).unwrap().into_inner();
        assert!(!file.exists());

        let session = result.session_id.expect("manifest written");
        let report = orch.rollback_session(&session).unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "sid=42");

        let sessions = orch.sessions().unwrap();
        assert!(sessions[0].rolled_back);
    }
}
