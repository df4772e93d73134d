use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::hasher;
use crate::common::errors::HashError;
use crate::scanner::item::{CleanableItem, Locator};

/// A set of byte-identical files sharing one canonical survivor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// SHA-256 of the shared content
    pub hash: String,
    /// Size of each member
    pub size_bytes: u64,
    /// Members, canonical first
    pub members: Vec<PathBuf>,
    /// The member that is kept
    pub canonical: PathBuf,
    /// `size_bytes * (members - 1)`
    pub wasted_bytes: u64,
}

impl DuplicateGroup {
    /// Every member except the canonical one
    pub fn redundant(&self) -> impl Iterator<Item = &PathBuf> {
        self.members.iter().filter(move |m| **m != self.canonical)
    }
}

/// Complete results from one detection run
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    /// Groups, most wasted space first
    pub groups: Vec<DuplicateGroup>,
    /// Regular files considered after scoping
    pub files_considered: usize,
    /// Files that shared a size with another file and were hashed
    pub candidates_hashed: usize,
    pub total_wasted: u64,
    /// Files dropped because they could not be read
    pub warnings: Vec<String>,
    pub duration_secs: f64,
}

struct Candidate {
    size: u64,
    modified: Option<DateTime<Utc>>,
}

/// Two-phase duplicate detection over file-domain items.
///
/// Pass 1 buckets by exact byte length (unique sizes and empty files drop
/// out). Pass 2 streams a SHA-256 over each surviving bucket, in parallel
/// across buckets; a file belongs to exactly one bucket so no file is read
/// twice concurrently. Unreadable files are dropped with a warning.
pub fn find_duplicates(
    root_scope: Option<&Path>,
    items: &[CleanableItem],
    chunk_size: usize,
) -> DuplicateReport {
    let start = Instant::now();
    let mut report = DuplicateReport::default();

    // ── Collect in-scope regular files ─────────────────────────────────────
    let mut candidates: HashMap<PathBuf, Candidate> = HashMap::new();
    for item in items {
        if !item.is_regular_file() {
            continue;
        }
        let Locator::Path(path) = &item.locator else {
            continue;
        };
        if let Some(root) = root_scope {
            if !path.starts_with(root) {
                continue;
            }
        }
        // hashing follows links, so a link and its target would always match
        if let Ok(meta) = std::fs::symlink_metadata(path) {
            if !meta.file_type().is_file() {
                tracing::debug!(path = %path.display(), "skipping non-regular duplicate candidate");
                continue;
            }
        }
        candidates.entry(path.clone()).or_insert(Candidate {
            size: item.size_bytes,
            modified: item.modified,
        });
    }
    report.files_considered = candidates.len();

    // ── Pass 1: Group by file size ────────────────────────────────────────
    let sized: Vec<(PathBuf, u64)> = candidates
        .iter()
        .map(|(path, c)| (path.clone(), c.size))
        .collect();
    let size_groups = hasher::group_by_size(&sized);
    report.candidates_hashed = size_groups.values().map(|v| v.len()).sum();
    tracing::debug!(
        files = report.files_considered,
        candidates = report.candidates_hashed,
        buckets = size_groups.len(),
        "size bucketing done"
    );

    // ── Pass 2: Full SHA-256 hash per bucket ──────────────────────────────
    let hashed: Vec<(u64, HashMap<String, Vec<PathBuf>>, Vec<HashError>)> = size_groups
        .into_par_iter()
        .map(|(size, paths)| {
            let (groups, errors) = hasher::group_by_full_hash(&paths, chunk_size);
            (size, groups, errors)
        })
        .collect();

    for (size, hash_groups, errors) in hashed {
        for e in errors {
            tracing::warn!(path = %e.path.display(), error = %e.source, "dropping unreadable duplicate candidate");
            report.warnings.push(e.to_string());
        }

        for (hash, mut members) in hash_groups {
            members.sort_by(|a, b| canonical_order(a, b, &candidates));
            let canonical = members[0].clone();
            let wasted_bytes = size * (members.len() as u64 - 1);
            report.groups.push(DuplicateGroup {
                hash,
                size_bytes: size,
                members,
                canonical,
                wasted_bytes,
            });
        }
    }

    report
        .groups
        .sort_by(|a, b| b.wasted_bytes.cmp(&a.wasted_bytes).then_with(|| a.hash.cmp(&b.hash)));
    report.total_wasted = report.groups.iter().map(|g| g.wasted_bytes).sum();
    report.duration_secs = start.elapsed().as_secs_f64();
    report
}

/// Earliest modification first; unknown timestamps last; ties broken by
/// the smallest path string
fn canonical_order(
    a: &Path,
    b: &Path,
    candidates: &HashMap<PathBuf, Candidate>,
) -> std::cmp::Ordering {
    let ma = candidates.get(a).and_then(|c| c.modified);
    let mb = candidates.get(b).and_then(|c| c.modified);
    let by_time = match (ma, mb) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    };
    by_time.then_with(|| a.to_string_lossy().cmp(&b.to_string_lossy()))
}
