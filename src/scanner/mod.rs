pub mod item;
pub mod provider;
pub mod risk;
pub mod walker;

pub use item::{Category, CleanableItem, Domain, Locator, ScanResult};
pub use provider::{EntryStore, ProviderOutput, ScanOptions, ScanProvider};
pub use risk::{RiskClassifier, RiskTier};
pub use walker::AreaProvider;
