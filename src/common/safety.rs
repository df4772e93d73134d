use std::path::Path;

/// Paths that must NEVER be erased under any circumstances.
/// A last line of defence against a misbehaving scan provider.
const PROTECTED_PATHS: &[&str] = &[
    "/",
    "/System",
    "/Applications",
    "/Users",
    "/Library",
    "/home",
    "/usr",
    "/bin",
    "/sbin",
    "/boot",
    "/var",
    "/etc",
    "/opt",
    "/private",
    "/Volumes",
    "C:\\",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Users",
];

/// Paths under home that must never be erased entirely
const PROTECTED_HOME_DIRS: &[&str] = &[
    "Desktop",
    "Documents",
    "Downloads",
    "Pictures",
    "Music",
    "Movies",
    "Videos",
    "Library",
    "Applications",
    "AppData",
    ".ssh",
    ".gnupg",
];

/// Check if a path is protected and should NEVER be erased
pub fn is_protected(path: &Path) -> bool {
    if PROTECTED_PATHS.iter().any(|p| path == Path::new(p)) {
        return true;
    }

    if let Some(home) = dirs::home_dir() {
        if path == home {
            return true;
        }
        if PROTECTED_HOME_DIRS.iter().any(|d| path == home.join(d)) {
            return true;
        }
    }

    false
}

/// Maximum number of items to clean in a single run before warning.
pub const MAX_ITEMS_PER_OPERATION: usize = 100_000;

/// Total bytes per run above which the batch is flagged (50 GB).
pub const MAX_BYTES_WARNING_THRESHOLD: u64 = 50 * 1024 * 1024 * 1024;

/// Flag runaway batches. Returns a warning message; callers decide
/// whether to proceed.
pub fn validate_batch(item_count: usize, total_bytes: u64) -> Result<(), String> {
    if item_count > MAX_ITEMS_PER_OPERATION {
        return Err(format!(
            "Batch would affect {} items (limit: {})",
            item_count, MAX_ITEMS_PER_OPERATION
        ));
    }

    if total_bytes > MAX_BYTES_WARNING_THRESHOLD {
        return Err(format!(
            "Batch would remove {} (>{} threshold)",
            crate::common::format::format_size(total_bytes),
            crate::common::format::format_size(MAX_BYTES_WARNING_THRESHOLD),
        ));
    }

    Ok(())
}
