use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use crate::common::format;

/// Point-in-time progress. Emitted, never stored long-term.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// Scan phase: provider steps
    Scan {
        step: usize,
        total: usize,
        label: String,
    },
    /// Clean phase: items processed
    Clean {
        processed: usize,
        total: usize,
        label: String,
    },
    /// Last snapshot of a run
    Finished { label: String },
}

impl Progress {
    pub fn label(&self) -> &str {
        match self {
            Progress::Scan { label, .. }
            | Progress::Clean { label, .. }
            | Progress::Finished { label } => label,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Progress::Finished { .. })
    }
}

/// Thread-safe receiver of progress snapshots.
///
/// Delivery is best effort: a sink may drop or coalesce intermediate
/// snapshots, but must keep the final one.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: Progress);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _progress: Progress) {}
}

/// Keeps only the most recent snapshot; a slow consumer polls `latest()`
#[derive(Debug, Default)]
pub struct LatestProgress {
    slot: Mutex<Option<Progress>>,
}

impl LatestProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Progress> {
        self.slot.lock().ok().and_then(|s| s.clone())
    }

    /// Forget the previous run before reusing the sink
    pub fn reset(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl ProgressSink for LatestProgress {
    fn emit(&self, progress: Progress) {
        if let Ok(mut slot) = self.slot.lock() {
            // a late intermediate snapshot never supersedes the final one
            if slot.as_ref().map(Progress::is_final).unwrap_or(false) && !progress.is_final() {
                return;
            }
            *slot = Some(progress);
        }
    }
}

/// Forwards every snapshot over an mpsc channel
#[derive(Debug)]
pub struct ChannelProgress {
    tx: Mutex<Sender<Progress>>,
}

impl ChannelProgress {
    pub fn new(tx: Sender<Progress>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, progress: Progress) {
        if let Ok(tx) = self.tx.lock() {
            // receiver gone: nobody is listening any more
            let _ = tx.send(progress);
        }
    }
}

/// Terminal progress bar for hosts that run the engine interactively
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━░"),
        );
        Self { bar }
    }

    /// Hidden bar, for tests and non-interactive hosts
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn emit(&self, progress: Progress) {
        match progress {
            Progress::Scan { step, total, label } => {
                self.bar.set_length(total as u64);
                self.bar.set_position(step as u64);
                self.bar.set_message(format::truncate(&label, 40));
            }
            Progress::Clean {
                processed,
                total,
                label,
            } => {
                self.bar.set_length(total as u64);
                self.bar.set_position(processed as u64);
                self.bar.set_message(format::truncate(&label, 40));
            }
            Progress::Finished { label } => {
                self.bar.finish_with_message(label);
            }
        }
    }
}
