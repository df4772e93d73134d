use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::risk::{base_tier, RiskTier};
use crate::duplicates::DuplicateGroup;

// ─── Core types ───────────────────────────────────────────────────────────────

/// Resource domain a category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    FileSystem,
    Browser,
    Registry,
    Startup,
}

/// Item category, matched exhaustively wherever behavior depends on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TempFile,
    Cache,
    Log,
    CrashReport,
    Trash,
    BrowserCache,
    BrowserHistory,
    BrowserCookies,
    /// Saved passwords, autofill and similar credential stores
    BrowserCredentials,
    RegistryEntry,
    StartupEntry,
    Duplicate,
    LargeFile,
    Other,
}

impl Category {
    pub fn domain(self) -> Domain {
        match self {
            Category::TempFile
            | Category::Cache
            | Category::Log
            | Category::CrashReport
            | Category::Trash
            | Category::Duplicate
            | Category::LargeFile
            | Category::Other => Domain::FileSystem,
            Category::BrowserCache
            | Category::BrowserHistory
            | Category::BrowserCookies
            | Category::BrowserCredentials => Domain::Browser,
            Category::RegistryEntry => Domain::Registry,
            Category::StartupEntry => Domain::Startup,
        }
    }

    /// Short name used in backup file names
    pub fn slug(self) -> &'static str {
        match self {
            Category::TempFile => "temp",
            Category::Cache => "cache",
            Category::Log => "log",
            Category::CrashReport => "crash",
            Category::Trash => "trash",
            Category::BrowserCache => "browser-cache",
            Category::BrowserHistory => "browser-history",
            Category::BrowserCookies => "browser-cookies",
            Category::BrowserCredentials => "browser-credentials",
            Category::RegistryEntry => "registry",
            Category::StartupEntry => "startup",
            Category::Duplicate => "duplicate",
            Category::LargeFile => "large-file",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::TempFile => write!(f, "Temporary Files"),
            Category::Cache => write!(f, "Cache"),
            Category::Log => write!(f, "Logs"),
            Category::CrashReport => write!(f, "Crash Reports"),
            Category::Trash => write!(f, "Trash"),
            Category::BrowserCache => write!(f, "Browser Cache"),
            Category::BrowserHistory => write!(f, "Browser History"),
            Category::BrowserCookies => write!(f, "Browser Cookies"),
            Category::BrowserCredentials => write!(f, "Browser Credentials"),
            Category::RegistryEntry => write!(f, "Registry Entry"),
            Category::StartupEntry => write!(f, "Startup Entry"),
            Category::Duplicate => write!(f, "Duplicate"),
            Category::LargeFile => write!(f, "Large File"),
            Category::Other => write!(f, "Other"),
        }
    }
}

/// Identity of an item: a filesystem path or a domain-specific key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Path(PathBuf),
    /// Registry key, startup entry name, ...
    Entry(String),
}

impl Locator {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Locator::Path(p) => Some(p),
            Locator::Entry(_) => None,
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Path(p) => write!(f, "{}", p.display()),
            Locator::Entry(key) => write!(f, "{}", key),
        }
    }
}

impl From<PathBuf> for Locator {
    fn from(p: PathBuf) -> Self {
        Locator::Path(p)
    }
}

impl From<&Path> for Locator {
    fn from(p: &Path) -> Self {
        Locator::Path(p.to_path_buf())
    }
}

/// A candidate unit of removable data found by a scan provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanableItem {
    pub locator: Locator,

    /// Size in bytes (sum of contents for directory-shaped items)
    pub size_bytes: u64,

    pub category: Category,

    /// Set by the risk classifier during the scan; starts at the
    /// category's base tier
    pub risk: RiskTier,

    /// Provider's own floor for the tier; the classifier never goes below it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_hint: Option<RiskTier>,

    /// Human-readable reason this is flagged
    pub description: String,

    pub modified: Option<DateTime<Utc>>,

    /// Directory-shaped item (removed recursively)
    #[serde(default)]
    pub is_dir: bool,

    /// Opaque provider data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl CleanableItem {
    pub fn new(locator: impl Into<Locator>, size_bytes: u64, category: Category) -> Self {
        Self {
            locator: locator.into(),
            size_bytes,
            category,
            risk: base_tier(category),
            risk_hint: None,
            description: String::new(),
            modified: None,
            is_dir: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Item for a non-file domain (registry key, startup entry)
    pub fn entry(key: impl Into<String>, size_bytes: u64, category: Category) -> Self {
        Self::new(Locator::Entry(key.into()), size_bytes, category)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_risk_hint(mut self, hint: RiskTier) -> Self {
        self.risk_hint = Some(hint);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn as_dir(mut self) -> Self {
        self.is_dir = true;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.locator.as_path()
    }

    /// Low-risk items start out selected; everything else is opt-in
    pub fn default_selected(&self) -> bool {
        self.risk.default_selected()
    }

    /// Plain file on disk, eligible for duplicate detection
    pub fn is_regular_file(&self) -> bool {
        !self.is_dir && matches!(self.locator, Locator::Path(_))
    }
}

/// Aggregate of one scan pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// When the scan was started
    pub timestamp: DateTime<Utc>,

    pub duration_secs: f64,

    /// Items, largest first
    pub items: Vec<CleanableItem>,

    pub total_size: u64,

    pub category_counts: BTreeMap<Category, usize>,

    /// Duplicate groups among file-domain items, when requested
    #[serde(default)]
    pub duplicates: Vec<DuplicateGroup>,

    /// Non-fatal provider and hashing warnings
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ScanResult {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            duration_secs: 0.0,
            items: Vec::new(),
            total_size: 0,
            category_counts: BTreeMap::new(),
            duplicates: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Recalculate totals from items
    pub fn recalculate(&mut self) {
        self.total_size = self.items.iter().map(|i| i.size_bytes).sum();
        self.category_counts.clear();
        for item in &self.items {
            *self.category_counts.entry(item.category).or_insert(0) += 1;
        }
    }

    pub fn filter_by_risk(&self, tier: RiskTier) -> Vec<&CleanableItem> {
        self.items.iter().filter(|i| i.risk == tier).collect()
    }

    pub fn find(&self, locator: &Locator) -> Option<&CleanableItem> {
        self.items.iter().find(|i| &i.locator == locator)
    }

    /// Sum of wasted bytes across duplicate groups
    pub fn duplicate_waste(&self) -> u64 {
        self.duplicates.iter().map(|g| g.wasted_bytes).sum()
    }
}
