use rand::RngCore;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::common::errors::EraseError;
use crate::common::safety;
use crate::duplicates::hasher::DEFAULT_CHUNK_SIZE;
use crate::scanner::item::{CleanableItem, Domain, Locator};
use crate::scanner::provider::EntryStore;
use crate::scanner::risk::RiskTier;

/// Overwrite patterns, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Zeros,
    Ones,
    Random,
}

pub const OVERWRITE_PASSES: [Pass; 3] = [Pass::Zeros, Pass::Ones, Pass::Random];

/// Destroys one item at the given tier. The orchestrator talks to this seam
/// so hosts can substitute their own destruction policy.
pub trait Eraser: Send + Sync {
    fn erase(&self, item: &CleanableItem, tier: RiskTier) -> Result<(), EraseError>;
}

/// A sink the overwrite passes can rewind and force to stable storage
trait Durable: Write + Seek {
    fn sync(&mut self) -> io::Result<()>;
}

impl Durable for std::fs::File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Destroys items: plain unlink below `High`, three-pass overwrite then
/// unlink at `High` and above.
pub struct SecureEraser {
    chunk_size: usize,
    entry_stores: HashMap<Domain, Arc<dyn EntryStore>>,
}

impl Default for SecureEraser {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureEraser {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            entry_stores: HashMap::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_entry_store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.entry_stores.insert(store.domain(), store);
        self
    }

    fn erase_path(&self, path: &Path, secure: bool) -> Result<(), EraseError> {
        if safety::is_protected(path) {
            return Err(EraseError::Protected {
                path: path.to_path_buf(),
            });
        }

        let meta = match std::fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "already gone");
                return Ok(());
            }
            Err(source) => {
                return Err(EraseError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if meta.is_dir() {
            return self.erase_dir(path, secure);
        }

        if secure && meta.is_file() {
            self.overwrite(path, meta.len())?;
        }
        std::fs::remove_file(path).map_err(|source| EraseError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deepest paths first, so a directory is only removed after its
    /// children. One failing entry never stops its siblings.
    fn erase_dir(&self, root: &Path, secure: bool) -> Result<(), EraseError> {
        let mut total = 0usize;
        let mut failures: Vec<String> = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .contents_first(true)
            .min_depth(1)
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    if e.io_error().map(|io| io.kind()) == Some(io::ErrorKind::NotFound) {
                        continue;
                    }
                    total += 1;
                    failures.push(e.to_string());
                    continue;
                }
            };
            total += 1;

            let path = entry.path();
            let file_type = entry.file_type();
            let result = if file_type.is_dir() {
                std::fs::remove_dir(path).map_err(|source| EraseError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            } else {
                let overwritten = if secure && file_type.is_file() {
                    let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    self.overwrite(path, len)
                } else {
                    Ok(())
                };
                overwritten.and_then(|()| {
                    std::fs::remove_file(path).map_err(|source| EraseError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                })
            };

            match result {
                Ok(()) => {}
                Err(EraseError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "entry survived erase");
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            match std::fs::remove_dir(root) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => failures.push(format!("{}: {}", root.display(), e)),
            }
        }

        Err(EraseError::Incomplete {
            path: root.to_path_buf(),
            failed: failures.len(),
            total: total + 1,
            first: failures.swap_remove(0),
        })
    }

    /// Overwrite the whole file once per pass, syncing between passes.
    /// Any I/O error abandons the remaining passes.
    fn overwrite(&self, path: &Path, len: u64) -> Result<(), EraseError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| EraseError::Overwrite {
                path: path.to_path_buf(),
                pass: 0,
                source,
            })?;
        self.overwrite_passes(&mut file, path, len)
    }

    fn overwrite_passes<D: Durable>(&self, file: &mut D, path: &Path, len: u64) -> Result<(), EraseError> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut rng = rand::thread_rng();

        for (index, pass) in OVERWRITE_PASSES.iter().enumerate() {
            let pass_no = index + 1;
            let fail = |source: io::Error| EraseError::Overwrite {
                path: path.to_path_buf(),
                pass: pass_no,
                source,
            };

            match pass {
                Pass::Zeros => buf.fill(0x00),
                Pass::Ones => buf.fill(0xFF),
                Pass::Random => {}
            }

            file.seek(SeekFrom::Start(0)).map_err(fail)?;
            let mut remaining = len;
            while remaining > 0 {
                let chunk = (remaining as usize).min(buf.len());
                if *pass == Pass::Random {
                    rng.fill_bytes(&mut buf[..chunk]);
                }
                file.write_all(&buf[..chunk]).map_err(fail)?;
                remaining -= chunk as u64;
            }
            file.flush().map_err(fail)?;
            file.sync().map_err(fail)?;
        }

        Ok(())
    }

    #[cfg(test)]
    fn overwrite_only(&self, path: &Path) -> Result<(), EraseError> {
        let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        self.overwrite(path, len)
    }
}

impl Eraser for SecureEraser {
    fn erase(&self, item: &CleanableItem, tier: RiskTier) -> Result<(), EraseError> {
        match &item.locator {
            Locator::Path(path) => self.erase_path(path, tier.requires_secure_erase()),
            Locator::Entry(key) => {
                let store = self.entry_stores.get(&item.category.domain()).ok_or_else(|| {
                    EraseError::NoEntryStore {
                        locator: key.clone(),
                    }
                })?;
                store.remove(key).map_err(|message| EraseError::EntryStore {
                    locator: key.clone(),
                    message,
                })
            }
        }
    }
}
