//! # Sweepsafe
//!
//! A risk-tiered scan, backup, verify and destroy pipeline for cleanup tools.
//!
//! Scan providers enumerate candidate items, the risk classifier tiers them,
//! and the orchestrator cleans a caller-chosen selection:
//!
//! - **Risk tiers**: `Safe < Low < Medium < High < Critical`; only `Low` and
//!   below are selected by default
//! - **Verified backups**: every item at `Medium` or above is copied and
//!   hash-checked before it is touched
//! - **Secure erase**: `High` and above get a three-pass overwrite before unlink
//! - **Duplicate detection**: size buckets first, SHA-256 only where sizes collide
//! - **Cooperative cancellation** and best-effort progress snapshots

pub mod cleaner;
pub mod common;
pub mod duplicates;
pub mod engine;
pub mod scanner;

pub use engine::{CleaningResult, EngineState, Orchestrator, RunOutcome, Selection};
pub use scanner::{CleanableItem, RiskTier, ScanResult};
