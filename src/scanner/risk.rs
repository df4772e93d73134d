use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::item::{Category, CleanableItem};
use crate::common::config::EngineConfig;

/// Ordered risk classification: `Safe < Low < Medium < High < Critical`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Caches, temp files: regenerated automatically
    #[default]
    Safe,
    /// Logs, trash: nothing depends on them
    Low,
    /// User data that is probably redundant; backed up before removal
    Medium,
    /// Settings and entries that change system behavior
    High,
    /// Credentials and other irreplaceable secrets
    Critical,
}

impl RiskTier {
    /// Tiers at or below `Low` start out selected
    pub fn default_selected(self) -> bool {
        self <= RiskTier::Low
    }

    /// Removal must be preceded by a verified backup
    pub fn requires_backup(self) -> bool {
        self >= RiskTier::Medium
    }

    /// Content is overwritten before unlinking
    pub fn requires_secure_erase(self) -> bool {
        self >= RiskTier::High
    }

    fn escalate(self) -> Self {
        match self {
            RiskTier::Safe => RiskTier::Low,
            RiskTier::Low => RiskTier::Medium,
            RiskTier::Medium => RiskTier::High,
            RiskTier::High | RiskTier::Critical => RiskTier::Critical,
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Safe => write!(f, "safe"),
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
            RiskTier::Critical => write!(f, "critical"),
        }
    }
}

/// Base tier for every category
pub fn base_tier(category: Category) -> RiskTier {
    match category {
        Category::TempFile | Category::Cache | Category::CrashReport | Category::BrowserCache => {
            RiskTier::Safe
        }
        Category::Log | Category::Trash => RiskTier::Low,
        Category::Duplicate | Category::LargeFile | Category::BrowserHistory | Category::Other => {
            RiskTier::Medium
        }
        Category::BrowserCookies | Category::RegistryEntry | Category::StartupEntry => {
            RiskTier::High
        }
        Category::BrowserCredentials => RiskTier::Critical,
    }
}

/// Pure classifier: item attributes in, tier out.
///
/// Starts from the category's base tier, escalates one step for very large
/// items and one step for recently modified ones, then never goes below the
/// provider's hint.
#[derive(Debug, Clone, Copy)]
pub struct RiskClassifier {
    pub large_item_bytes: u64,
    pub recent_window: Duration,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RiskClassifier {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            large_item_bytes: config.large_item_bytes(),
            recent_window: Duration::hours(config.recent_window_hours as i64),
        }
    }

    /// `now` is the scan's reference time, so identical input always
    /// classifies identically.
    pub fn classify(&self, item: &CleanableItem, now: DateTime<Utc>) -> RiskTier {
        let mut tier = base_tier(item.category);

        if self.large_item_bytes > 0 && item.size_bytes >= self.large_item_bytes {
            tier = tier.escalate();
        }

        if let Some(modified) = item.modified {
            if now.signed_duration_since(modified) < self.recent_window {
                tier = tier.escalate();
            }
        }

        match item.risk_hint {
            Some(hint) => tier.max(hint),
            None => tier,
        }
    }

    /// Classify in place
    pub fn annotate(&self, items: &mut [CleanableItem], now: DateTime<Utc>) {
        for item in items.iter_mut() {
            item.risk = self.classify(item, now);
        }
    }
}
