use std::collections::BTreeSet;

use crate::duplicates::grouper::DuplicateGroup;
use crate::duplicates::resolver::{self, ResolvedDuplicates};
use crate::scanner::item::{CleanableItem, Locator, ScanResult};

/// Caller-owned set of selected locators, kept apart from the scan record
/// so the `ScanResult` itself never changes after the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: BTreeSet<Locator>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything at `Low` or below starts selected
    pub fn from_defaults(result: &ScanResult) -> Self {
        Self {
            selected: result
                .items
                .iter()
                .filter(|i| i.default_selected())
                .map(|i| i.locator.clone())
                .collect(),
        }
    }

    pub fn select(&mut self, locator: impl Into<Locator>) {
        self.selected.insert(locator.into());
    }

    pub fn deselect(&mut self, locator: &Locator) {
        self.selected.remove(locator);
    }

    /// Flip one item, returning its new state
    pub fn toggle(&mut self, locator: &Locator) -> bool {
        if self.selected.remove(locator) {
            false
        } else {
            self.selected.insert(locator.clone());
            true
        }
    }

    pub fn is_selected(&self, locator: &Locator) -> bool {
        self.selected.contains(locator)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Select every non-canonical duplicate that survives resolution.
    /// Returns the resolution so callers can surface rejected members.
    pub fn select_redundant_duplicates(
        &mut self,
        groups: &[DuplicateGroup],
        verify_bytewise: bool,
        chunk_size: usize,
    ) -> ResolvedDuplicates {
        let resolved = resolver::redundant_members(groups, verify_bytewise, chunk_size);
        for path in &resolved.removable {
            self.selected.insert(Locator::Path(path.clone()));
        }
        resolved
    }

    /// Selected items in scan order, ready for `clean`. Locators that are
    /// not part of `result` are ignored.
    pub fn selected_items(&self, result: &ScanResult) -> Vec<CleanableItem> {
        result
            .items
            .iter()
            .filter(|i| self.selected.contains(&i.locator))
            .cloned()
            .collect()
    }

    pub fn selected_size(&self, result: &ScanResult) -> u64 {
        result
            .items
            .iter()
            .filter(|i| self.selected.contains(&i.locator))
            .map(|i| i.size_bytes)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::item::Category;
    use crate::scanner::risk::RiskTier;
    use chrono::Utc;
    use std::path::PathBuf;

    fn result() -> ScanResult {
        let mut result = ScanResult::new(Utc::now());
        let mut safe = CleanableItem::new(PathBuf::from("/tmp/a.tmp"), 10, Category::TempFile);
        safe.risk = RiskTier::Safe;
        let mut risky = CleanableItem::new(PathBuf::from("/tmp/c.db"), 20, Category::BrowserCookies);
        risky.risk = RiskTier::High;
        result.items = vec![safe, risky];
        result.recalculate();
        result
    }

    #[test]
    fn test_defaults_only_pick_low_risk() {
        let result = result();
        let selection = Selection::from_defaults(&result);
        assert!(selection.is_selected(&Locator::Path(PathBuf::from("/tmp/a.tmp"))));
        assert!(!selection.is_selected(&Locator::Path(PathBuf::from("/tmp/c.db"))));
        assert_eq!(selection.selected_size(&result), 10);
    }

    #[test]
    fn test_toggle_and_selected_items() {
        let result = result();
        let mut selection = Selection::from_defaults(&result);
        let risky = Locator::Path(PathBuf::from("/tmp/c.db"));

        assert!(selection.toggle(&risky));
        assert_eq!(selection.selected_items(&result).len(), 2);

        assert!(!selection.toggle(&risky));
        selection.select(PathBuf::from("/not/in/scan"));
        let items = selection.selected_items(&result);
        assert_eq!(items.len(), 1, "unknown locators are ignored");
        assert_eq!(items[0].size_bytes, 10);
    }
}
