use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use super::item::CleanableItem;
use super::provider::{ProviderOutput, ScanOptions, ScanProvider};
use crate::common::config::{EngineConfig, ScanArea};
use crate::common::errors::ProviderScanError;
use crate::engine::cancel::CancelToken;
use crate::engine::progress::{Progress, ProgressSink};

/// Built-in file-domain provider over the configured scan areas.
///
/// Emits one item per file found, in walk order.
#[derive(Debug, Clone)]
pub struct AreaProvider {
    name: String,
    areas: Vec<ScanArea>,
    exclude_paths: Vec<String>,
}

impl AreaProvider {
    pub const NAME: &'static str = "areas";

    pub fn new(areas: Vec<ScanArea>) -> Self {
        Self {
            name: Self::NAME.to_string(),
            areas,
            exclude_paths: Vec::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            name: Self::NAME.to_string(),
            areas: config.scan_areas.clone(),
            exclude_paths: config.exclude_paths.clone(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.display().to_string();
        self.exclude_paths.iter().any(|p| path_str.contains(p))
    }

    /// Walk one area, appending to `output`. Returns false when cancelled.
    fn walk_area(
        &self,
        area: &ScanArea,
        options: &ScanOptions,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
        output: &mut ProviderOutput,
        seen: &mut usize,
    ) -> bool {
        let batch = options.progress_batch_size.max(1);

        for base_path in expand_paths(&area.paths) {
            if !base_path.exists() {
                continue;
            }

            let walker = if area.recursive {
                WalkDir::new(&base_path).follow_links(false)
            } else {
                WalkDir::new(&base_path).follow_links(false).max_depth(1)
            };

            for entry in walker {
                if cancel.is_cancelled() {
                    return false;
                }

                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        output
                            .warnings
                            .push(format!("{}: walk error: {}", area.name, e));
                        continue;
                    }
                };

                // Regular files only: directories, symlinks and special files are skipped
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                if self.is_excluded(path) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        output.warnings.push(format!(
                            "{}: cannot stat '{}': {}",
                            area.name,
                            path.display(),
                            e
                        ));
                        continue;
                    }
                };

                let size = metadata.len();
                if size < options.min_file_size {
                    continue;
                }

                let modified = metadata.modified().ok();
                if let (Some(min_days), Some(mod_time)) = (area.min_age_days, modified) {
                    let age = SystemTime::now()
                        .duration_since(mod_time)
                        .unwrap_or_default();
                    if age.as_secs() < (min_days as u64 * 86400) {
                        continue;
                    }
                }

                let mut item = CleanableItem::new(path.to_path_buf(), size, area.category)
                    .with_description(area.name.clone());
                if let Some(mod_time) = modified {
                    item = item.with_modified(DateTime::<Utc>::from(mod_time));
                }
                output.items.push(item);

                *seen += 1;
                if *seen % batch == 0 {
                    progress.emit(Progress::Scan {
                        step: *seen,
                        total: 0,
                        label: format!("{} files in {}", seen, area.name),
                    });
                }
            }
        }

        true
    }
}

impl ScanProvider for AreaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(
        &self,
        options: &ScanOptions,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ProviderOutput, ProviderScanError> {
        let mut output = ProviderOutput::default();
        let mut seen = 0usize;

        for area in &self.areas {
            if cancel.is_cancelled() {
                break;
            }
            if !self.walk_area(area, options, progress, cancel, &mut output, &mut seen) {
                tracing::debug!(provider = %self.name, area = %area.name, "area walk cancelled");
                break;
            }
        }

        Ok(output)
    }
}

/// Expand `~` and glob patterns in paths
pub fn expand_paths(paths: &[String]) -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_default();
    let mut expanded = Vec::new();

    for path_str in paths {
        let resolved = match path_str.strip_prefix('~') {
            Some(rest) => format!("{}{}", home.display(), rest),
            None => path_str.clone(),
        };

        // Handle glob patterns
        if resolved.contains('*') || resolved.contains('?') || resolved.contains('[') {
            if let Ok(entries) = glob::glob(&resolved) {
                expanded.extend(entries.filter_map(|e| e.ok()));
            }
        } else {
            expanded.push(PathBuf::from(resolved));
        }
    }

    expanded
}

/// Calculate total logical size of a file or directory tree
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.metadata().map(|m| m.len()).unwrap_or(0))
        .sum()
}
