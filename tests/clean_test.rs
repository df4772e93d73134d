use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use sweepsafe::cleaner::{BackupManager, BackupRecord, BackupStore, Eraser, SecureEraser};
use sweepsafe::common::config::EngineConfig;
use sweepsafe::common::errors::{
    BackupError, EngineError, EraseError, FailureReason, ProviderScanError, RestoreError,
};
use sweepsafe::duplicates::hasher;
use sweepsafe::engine::{
    CancelToken, EngineState, LatestProgress, NoProgress, Orchestrator, Progress, ProgressSink,
};
use sweepsafe::scanner::{
    Category, CleanableItem, Domain, EntryStore, Locator, ProviderOutput, RiskTier, ScanOptions,
    ScanProvider,
};

/// Write `count` files and return them as items at the given tier
fn make_items(dir: &Path, count: usize, category: Category, risk: RiskTier) -> Vec<CleanableItem> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("item{}.dat", i + 1));
            let content = format!("content of item {}", i + 1);
            std::fs::write(&path, &content).unwrap();
            let mut item = CleanableItem::new(path, content.len() as u64, category);
            item.risk = risk;
            item
        })
        .collect()
}

fn config(dir: &Path) -> EngineConfig {
    EngineConfig::with_data_dir(dir.join("data"))
}

/// Delegates to a real manager but reports a mismatch for one path
struct MismatchFor {
    inner: BackupManager,
    target: PathBuf,
}

impl BackupStore for MismatchFor {
    fn backup(&self, item: &CleanableItem) -> Result<BackupRecord, BackupError> {
        if item.path() == Some(self.target.as_path()) {
            return Err(BackupError::VerificationFailed {
                locator: item.locator.to_string(),
                source_hash: "source".into(),
                backup_hash: "corrupt".into(),
            });
        }
        self.inner.backup(item)
    }

    fn restore(&self, record: &BackupRecord) -> Result<(), RestoreError> {
        self.inner.restore(record)
    }
}

/// Blocks inside the first backup until the test releases it
struct GatedStore {
    inner: BackupManager,
    entered: Mutex<Sender<()>>,
    gate: Mutex<Receiver<()>>,
}

impl BackupStore for GatedStore {
    fn backup(&self, item: &CleanableItem) -> Result<BackupRecord, BackupError> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.gate.lock().unwrap().recv();
        self.inner.backup(item)
    }

    fn restore(&self, record: &BackupRecord) -> Result<(), RestoreError> {
        self.inner.restore(record)
    }
}

/// Cancels the orchestrator once `after` items have been processed
struct CancelAfter {
    orchestrator: Orchestrator,
    after: usize,
    last: LatestProgress,
}

impl ProgressSink for CancelAfter {
    fn emit(&self, progress: Progress) {
        if let Progress::Clean { processed, .. } = &progress {
            if *processed == self.after {
                self.orchestrator.cancel();
            }
        }
        self.last.emit(progress);
    }
}

/// Zero-fills one file, then reports the overwrite as broken off
struct BreaksMidway {
    inner: SecureEraser,
    target: PathBuf,
}

impl Eraser for BreaksMidway {
    fn erase(&self, item: &CleanableItem, tier: RiskTier) -> Result<(), EraseError> {
        if item.path() != Some(self.target.as_path()) {
            return self.inner.erase(item, tier);
        }
        let len = std::fs::metadata(&self.target).unwrap().len() as usize;
        std::fs::write(&self.target, vec![0u8; len]).unwrap();
        Err(EraseError::Overwrite {
            path: self.target.clone(),
            pass: 2,
            source: std::io::Error::new(std::io::ErrorKind::Other, "device unplugged"),
        })
    }
}

/// Startup entries kept in memory
#[derive(Default)]
struct MemoryStartup {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl EntryStore for MemoryStartup {
    fn domain(&self) -> Domain {
        Domain::Startup
    }

    fn export(&self, key: &str) -> Result<Vec<u8>, String> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| format!("no entry '{}'", key))
    }

    fn import(&self, key: &str, data: &[u8]) -> Result<(), String> {
        self.entries.lock().unwrap().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.entries
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| format!("no entry '{}'", key))
    }
}

/// Reports one entry, waits for the test, then one more unless cancelled
struct GatedProvider {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl ScanProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    fn scan(
        &self,
        _options: &ScanOptions,
        _progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ProviderOutput, ProviderScanError> {
        let mut output = ProviderOutput::default();
        output
            .items
            .push(CleanableItem::entry("startup:first", 0, Category::StartupEntry));
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        if !cancel.is_cancelled() {
            output
                .items
                .push(CleanableItem::entry("startup:second", 0, Category::StartupEntry));
        }
        Ok(output)
    }
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn test_backup_mismatch_fails_only_that_item() {
    let dir = TempDir::new().unwrap();
    let items = make_items(dir.path(), 5, Category::BrowserHistory, RiskTier::Medium);
    let third = items[2].path().unwrap().to_path_buf();

    let store = MismatchFor {
        inner: BackupManager::new(dir.path().join("backups")),
        target: third.clone(),
    };
    let orch = Orchestrator::builder(config(dir.path()))
        .backup_store(Arc::new(store))
        .build();

    let result = orch.clean(items, &NoProgress).unwrap().into_inner();

    assert_eq!(result.cleaned.len(), 4);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].reason, FailureReason::BackupVerificationFailed);
    assert_eq!(result.failed[0].reason.to_string(), "BackupVerificationFailed");
    assert!(third.exists(), "Item 3 must survive an unverified backup");
    assert!(!result.success());
    assert_eq!(orch.state(), EngineState::Completed);
}

#[test]
fn test_cancel_after_two_items() {
    let dir = TempDir::new().unwrap();
    let items = make_items(dir.path(), 10, Category::TempFile, RiskTier::Safe);
    let paths: Vec<PathBuf> = items.iter().map(|i| i.path().unwrap().to_path_buf()).collect();

    let orch = Orchestrator::builder(config(dir.path())).build();
    let sink = CancelAfter {
        orchestrator: orch.clone(),
        after: 2,
        last: LatestProgress::new(),
    };

    let outcome = orch.clean(items, &sink).unwrap();
    assert!(outcome.is_cancelled());
    let result = outcome.into_inner();

    assert_eq!(orch.state(), EngineState::Cancelled);
    assert_eq!(result.cleaned.len(), 2);
    assert!(result.failed.is_empty());
    assert!(!paths[0].exists() && !paths[1].exists());
    for path in &paths[2..] {
        assert!(path.exists(), "{} should be untouched", path.display());
    }
    assert!(
        sink.last.latest().unwrap().is_final(),
        "The final snapshot is always delivered"
    );
}

// ─── Invariants ───────────────────────────────────────────────────────────────

#[test]
fn test_medium_and_above_always_have_verified_backup() {
    let dir = TempDir::new().unwrap();
    let mut items = Vec::new();
    for (i, (category, risk)) in [
        (Category::TempFile, RiskTier::Safe),
        (Category::Log, RiskTier::Low),
        (Category::BrowserHistory, RiskTier::Medium),
        (Category::BrowserCookies, RiskTier::High),
        (Category::BrowserCredentials, RiskTier::Critical),
    ]
    .into_iter()
    .enumerate()
    {
        let path = dir.path().join(format!("f{}", i));
        std::fs::write(&path, format!("payload {}", i)).unwrap();
        let mut item = CleanableItem::new(path, 9, category);
        item.risk = risk;
        items.push(item);
    }

    let orch = Orchestrator::builder(config(dir.path())).build();
    let result = orch.clean(items, &NoProgress).unwrap().into_inner();
    assert!(result.success());

    for item in &result.cleaned {
        if item.risk.requires_backup() {
            let backup = result
                .backups
                .iter()
                .find(|b| b.source == item.locator)
                .expect("cleaned item at Medium or above must have a backup");
            assert!(backup.authorizes_destruction());
            assert!(backup.backup_path.exists());
        }
    }
    assert_eq!(result.backups.len(), 3);
}

#[test]
fn test_freed_total_and_disjoint_lists() {
    let dir = TempDir::new().unwrap();
    let mut items = make_items(dir.path(), 4, Category::Cache, RiskTier::Safe);
    // vanishes from under the engine: erasing a missing file still counts
    std::fs::remove_file(items[1].path().unwrap()).unwrap();
    let mut protected = CleanableItem::new(PathBuf::from("/"), 0, Category::Other).as_dir();
    protected.risk = RiskTier::Safe;
    items.push(protected);

    let orch = Orchestrator::builder(config(dir.path())).build();
    let result = orch.clean(items, &NoProgress).unwrap().into_inner();

    let summed: u64 = result.cleaned.iter().map(|i| i.size_bytes).sum();
    assert_eq!(result.total_size_freed, summed);
    for failed in &result.failed {
        assert!(
            !result.cleaned.iter().any(|c| c.locator == failed.item.locator),
            "{} is both cleaned and failed",
            failed.item.locator
        );
    }
    assert_eq!(result.cleaned.len(), 4);
    assert_eq!(result.failed.len(), 1);
}

#[test]
fn test_clean_processes_in_risk_order() {
    let dir = TempDir::new().unwrap();
    let mut items = make_items(dir.path(), 3, Category::TempFile, RiskTier::Safe);
    items[0].risk = RiskTier::High;
    items[1].risk = RiskTier::Medium;

    let (tx, rx) = channel();
    let sink = sweepsafe::engine::ChannelProgress::new(tx);
    let orch = Orchestrator::builder(config(dir.path())).build();
    let result = orch.clean(items, &sink).unwrap().into_inner();

    let tiers: Vec<RiskTier> = result.cleaned.iter().map(|i| i.risk).collect();
    assert_eq!(tiers, vec![RiskTier::Safe, RiskTier::Medium, RiskTier::High]);

    let snapshots: Vec<Progress> = rx.try_iter().collect();
    assert_eq!(snapshots.len(), 4, "One per item plus the final snapshot");
    assert!(snapshots.last().unwrap().is_final());
}

// ─── Backup round trip ────────────────────────────────────────────────────────

#[test]
fn test_backup_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("profile.db");
    let content: Vec<u8> = (0..50_000).map(|i| (i % 253) as u8).collect();
    std::fs::write(&file, &content).unwrap();
    let original = hasher::full_hash(&file, 4096).unwrap();

    let manager = BackupManager::new(dir.path().join("backups")).with_chunk_size(4096);
    let record = manager
        .backup(&CleanableItem::new(file.clone(), content.len() as u64, Category::BrowserHistory))
        .unwrap();
    assert_eq!(record.source_hash, original);

    std::fs::remove_file(&file).unwrap();
    manager.restore(&record).unwrap();
    assert_eq!(hasher::full_hash(&file, 4096).unwrap(), original);
}

#[test]
fn test_rollback_after_clean() {
    let dir = TempDir::new().unwrap();
    let items = make_items(dir.path(), 3, Category::BrowserCookies, RiskTier::High);
    let paths: Vec<PathBuf> = items.iter().map(|i| i.path().unwrap().to_path_buf()).collect();

    let orch = Orchestrator::builder(config(dir.path())).build();
    let result = orch.clean(items, &NoProgress).unwrap().into_inner();
    assert!(paths.iter().all(|p| !p.exists()));

    let report = orch.rollback_session(result.session_id.as_deref().unwrap()).unwrap();
    assert_eq!(report.restored.len(), 3);
    assert!(report.failed.is_empty());
    for (i, path) in paths.iter().enumerate() {
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            format!("content of item {}", i + 1)
        );
    }
}

// ─── State machine ────────────────────────────────────────────────────────────

#[test]
fn test_scan_rejected_while_cleaning() {
    let dir = TempDir::new().unwrap();
    let items = make_items(dir.path(), 1, Category::BrowserHistory, RiskTier::Medium);

    let (entered_tx, entered_rx) = channel();
    let (gate_tx, gate_rx) = channel();
    let store = GatedStore {
        inner: BackupManager::new(dir.path().join("backups")),
        entered: Mutex::new(entered_tx),
        gate: Mutex::new(gate_rx),
    };
    let orch = Orchestrator::builder(config(dir.path()))
        .backup_store(Arc::new(store))
        .build();

    let job = orch.start_clean(items, Arc::new(NoProgress)).unwrap();
    entered_rx.recv().unwrap();
    assert_eq!(orch.state(), EngineState::Cleaning);

    let err = orch.scan(&ScanOptions::default(), &NoProgress).err().unwrap();
    assert!(matches!(
        err,
        EngineError::StateConflict {
            current: EngineState::Cleaning,
            ..
        }
    ));
    assert!(orch.start_clean(Vec::new(), Arc::new(NoProgress)).is_err());
    assert!(matches!(
        orch.rollback_session("any"),
        Err(EngineError::StateConflict {
            current: EngineState::Cleaning,
            requested: "rollback",
        })
    ));
    assert!(orch.purge_expired_backups().is_err());

    gate_tx.send(()).unwrap();
    let result = job.join().unwrap().into_inner();
    assert_eq!(result.cleaned.len(), 1);
    assert_eq!(orch.state(), EngineState::Completed);

    // terminal state accepts the next run
    assert!(orch.scan(&ScanOptions::default(), &NoProgress).is_ok());
    assert_eq!(orch.state(), EngineState::Scanned);
}

#[test]
fn test_entry_item_without_store_fails() {
    let dir = TempDir::new().unwrap();
    let mut item = CleanableItem::entry("HKCU\\Software\\Vendor\\Run\\updater", 0, Category::StartupEntry);
    item.risk = RiskTier::High;

    let orch = Orchestrator::builder(config(dir.path())).build();
    let result = orch.clean(vec![item], &NoProgress).unwrap().into_inner();

    assert_eq!(result.failed.len(), 1);
    assert!(matches!(result.failed[0].reason, FailureReason::BackupFailed(_)));
    assert_eq!(
        result.failed[0].item.locator,
        Locator::Entry("HKCU\\Software\\Vendor\\Run\\updater".into())
    );
}

#[test]
fn test_caller_built_credentials_are_backed_up_and_shredded() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("Login Data");
    std::fs::write(&file, "user:hunter2:site").unwrap();

    // never went through a scan, and the caller even lowered the tier
    let mut item = CleanableItem::new(file.clone(), 17, Category::BrowserCredentials);
    assert_eq!(item.risk, RiskTier::Critical);
    item.risk = RiskTier::Safe;

    let orch = Orchestrator::builder(config(dir.path())).build();
    let result = orch.clean(vec![item], &NoProgress).unwrap().into_inner();

    assert_eq!(result.cleaned.len(), 1);
    assert_eq!(result.cleaned[0].risk, RiskTier::Critical);
    assert_eq!(result.backups.len(), 1);
    assert!(result.backups[0].authorizes_destruction());
    assert!(!file.exists());
}

// ─── Partial erase ────────────────────────────────────────────────────────────

#[test]
fn test_broken_overwrite_fails_item_and_batch_continues() {
    let dir = TempDir::new().unwrap();
    let items = make_items(dir.path(), 3, Category::BrowserCookies, RiskTier::High);
    let paths: Vec<PathBuf> = items.iter().map(|i| i.path().unwrap().to_path_buf()).collect();

    let orch = Orchestrator::builder(config(dir.path()))
        .eraser(Arc::new(BreaksMidway {
            inner: SecureEraser::new(),
            target: paths[1].clone(),
        }))
        .build();
    let result = orch.clean(items, &NoProgress).unwrap().into_inner();

    assert_eq!(result.cleaned.len(), 2);
    assert_eq!(result.failed.len(), 1);
    assert!(matches!(result.failed[0].reason, FailureReason::EraseFailed(_)));
    assert!(result.failed[0].backup.is_some(), "Backup was taken before the erase");
    assert!(paths[1].exists(), "The damaged file is left in place");
    assert!(!paths[0].exists() && !paths[2].exists());
    assert_eq!(orch.state(), EngineState::Completed);

    let report = orch.rollback_session(result.session_id.as_deref().unwrap()).unwrap();
    assert_eq!(report.restored.len(), 3, "Damaged item is restored too: {:?}", report.failed);
    for (i, path) in paths.iter().enumerate() {
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            format!("content of item {}", i + 1)
        );
    }
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "Damaged copy is discarded after restore");
    assert_eq!(orch.state(), EngineState::Completed, "Rollback returns to the prior state");
}

// ─── Entry stores ─────────────────────────────────────────────────────────────

#[test]
fn test_entry_store_backup_erase_and_restore() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStartup::default());
    store.import("updater", b"C:\\Vendor\\updater.exe --silent").unwrap();

    let orch = Orchestrator::builder(config(dir.path()))
        .entry_store(store.clone())
        .build();
    let item = CleanableItem::entry("updater", 0, Category::StartupEntry);
    let result = orch.clean(vec![item], &NoProgress).unwrap().into_inner();

    assert!(result.success(), "{:?}", result.failed);
    assert_eq!(result.backups.len(), 1);
    assert_eq!(result.backups[0].source, Locator::Entry("updater".into()));
    assert!(store.entries.lock().unwrap().is_empty());

    let report = orch.rollback_session(result.session_id.as_deref().unwrap()).unwrap();
    assert_eq!(report.restored, vec![Locator::Entry("updater".into())]);
    assert_eq!(
        store.export("updater").unwrap(),
        b"C:\\Vendor\\updater.exe --silent".to_vec()
    );
}

// ─── Background jobs ──────────────────────────────────────────────────────────

#[test]
fn test_background_scan_cancelled_midway() {
    let dir = TempDir::new().unwrap();
    let (entered_tx, entered_rx) = channel();
    let (release_tx, release_rx) = channel();
    let orch = Orchestrator::builder(config(dir.path()))
        .provider(GatedProvider {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        })
        .build();

    let options = ScanOptions::from_config(orch.config());
    let job = orch.start_scan(options, Arc::new(NoProgress)).unwrap();
    entered_rx.recv().unwrap();
    assert_eq!(orch.state(), EngineState::Scanning);

    orch.cancel();
    release_tx.send(()).unwrap();
    let outcome = job.join().unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.value().items.len(), 1, "Items found before the cancel are kept");
    assert_eq!(orch.state(), EngineState::Cancelled);
}

#[test]
fn test_background_scan_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let (entered_tx, _entered_rx) = channel();
    let (release_tx, release_rx) = channel();
    release_tx.send(()).unwrap();
    let orch = Orchestrator::builder(config(dir.path()))
        .provider(GatedProvider {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        })
        .build();

    let job = orch.start_scan(ScanOptions::default(), Arc::new(NoProgress)).unwrap();
    while !job.is_finished() {
        std::thread::sleep(Duration::from_millis(5));
    }
    let outcome = job.join().unwrap();

    assert!(!outcome.is_cancelled());
    assert_eq!(outcome.into_inner().items.len(), 2);
    assert_eq!(orch.state(), EngineState::Scanned);
}

// ─── Retention ────────────────────────────────────────────────────────────────

#[test]
fn test_purge_uses_configured_retention() {
    let dir = TempDir::new().unwrap();
    let items = make_items(dir.path(), 1, Category::BrowserHistory, RiskTier::Medium);
    let mut cfg = config(dir.path());
    cfg.backup_retention_days = 0;

    let orch = Orchestrator::builder(cfg).build();
    let result = orch.clean(items, &NoProgress).unwrap().into_inner();
    let backup_path = result.backups[0].backup_path.clone();
    assert!(backup_path.exists());

    std::thread::sleep(Duration::from_millis(20));
    let report = orch.purge_expired_backups().unwrap();
    assert_eq!(report.purged.len(), 1);
    assert!(!backup_path.exists());
    assert_eq!(orch.state(), EngineState::Completed);
}
