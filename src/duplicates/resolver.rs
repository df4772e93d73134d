use std::path::PathBuf;

use super::grouper::DuplicateGroup;
use super::hasher;

/// Members picked for automatic removal
#[derive(Debug, Clone, Default)]
pub struct ResolvedDuplicates {
    /// Non-canonical members safe to remove
    pub removable: Vec<PathBuf>,
    /// Total bytes that would be freed
    pub bytes_freed: u64,
    /// Members excluded because byte verification failed or errored
    pub rejected: Vec<String>,
}

/// Pick every non-canonical member of each group for removal.
///
/// With `verify_bytewise`, each member is first compared byte-for-byte with
/// its canonical file; anything that differs or cannot be read stays put.
/// Interactive selection can skip verification since a person reviews it.
pub fn redundant_members(
    groups: &[DuplicateGroup],
    verify_bytewise: bool,
    chunk_size: usize,
) -> ResolvedDuplicates {
    let mut resolved = ResolvedDuplicates::default();

    for group in groups {
        for member in group.redundant() {
            if verify_bytewise {
                match hasher::files_identical(&group.canonical, member, chunk_size) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(member = %member.display(), "hash match but bytes differ");
                        resolved.rejected.push(format!(
                            "'{}' differs from '{}'",
                            member.display(),
                            group.canonical.display()
                        ));
                        continue;
                    }
                    Err(e) => {
                        resolved.rejected.push(format!(
                            "cannot compare '{}': {}",
                            member.display(),
                            e
                        ));
                        continue;
                    }
                }
            }
            resolved.removable.push(member.clone());
            resolved.bytes_freed += group.size_bytes;
        }
    }

    resolved
}
