use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::common::errors::HashError;

/// Default chunk for streaming reads (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Stream a reader through SHA-256 in fixed-size chunks
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Full SHA-256 of a file, never loading it whole into memory
pub fn full_hash(path: &Path, chunk_size: usize) -> Result<String, HashError> {
    File::open(path)
        .and_then(|file| hash_reader(file, chunk_size))
        .map_err(|source| HashError {
            path: path.to_path_buf(),
            source,
        })
}

/// Content hash of a file or a whole directory tree.
///
/// A tree hash covers every entry's relative path, its kind and, for files,
/// its content, walked in sorted order so the result is stable.
pub fn content_hash(path: &Path, chunk_size: usize) -> io::Result<String> {
    let meta = std::fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return File::open(path).and_then(|f| hash_reader(f, chunk_size));
    }

    let mut tree = Sha256::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let file_type = entry.file_type();
        if file_type.is_dir() {
            tree.update(b"d\0");
            tree.update(rel.as_bytes());
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            tree.update(b"l\0");
            tree.update(rel.as_bytes());
            tree.update(b"\0");
            tree.update(target.to_string_lossy().as_bytes());
        } else {
            let file_hash = File::open(entry.path()).and_then(|f| hash_reader(f, chunk_size))?;
            tree.update(b"f\0");
            tree.update(rel.as_bytes());
            tree.update(b"\0");
            tree.update(file_hash.as_bytes());
        }
        tree.update(b"\n");
    }

    Ok(format!("{:x}", tree.finalize()))
}

/// Byte-for-byte comparison of two files
pub fn files_identical(a: &Path, b: &Path, chunk_size: usize) -> io::Result<bool> {
    let mut fa = File::open(a)?;
    let mut fb = File::open(b)?;
    if fa.metadata()?.len() != fb.metadata()?.len() {
        return Ok(false);
    }

    let chunk = chunk_size.max(1);
    let mut buf_a = vec![0u8; chunk];
    let mut buf_b = vec![0u8; chunk];
    loop {
        let n = read_full(&mut fa, &mut buf_a)?;
        let m = read_full(&mut fb, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill as much of `buf` as the reader allows
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Group files by their byte length.
/// Pass 1: files with a unique size cannot be duplicates, and zero-length
/// files are never reported.
pub fn group_by_size(files: &[(PathBuf, u64)]) -> HashMap<u64, Vec<PathBuf>> {
    let mut groups: HashMap<u64, Vec<PathBuf>> = HashMap::new();

    for (path, size) in files {
        if *size == 0 {
            continue;
        }
        groups.entry(*size).or_default().push(path.clone());
    }

    // Only keep groups with 2+ files (potential duplicates)
    groups.retain(|_, v| v.len() > 1);
    groups
}

/// Group files by full SHA-256 hash.
/// Pass 2: unreadable files drop out of the bucket and come back as errors.
pub fn group_by_full_hash(
    files: &[PathBuf],
    chunk_size: usize,
) -> (HashMap<String, Vec<PathBuf>>, Vec<HashError>) {
    let mut groups: HashMap<String, Vec<PathBuf>> = HashMap::new();
    let mut errors = Vec::new();

    for path in files {
        match full_hash(path, chunk_size) {
            Ok(hash) => groups.entry(hash).or_default().push(path.clone()),
            Err(e) => errors.push(e),
        }
    }

    groups.retain(|_, v| v.len() > 1);
    (groups, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_does_not_change_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("f.bin");
        let content: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
        std::fs::write(&file, &content).unwrap();

        let small = full_hash(&file, 7).unwrap();
        let large = full_hash(&file, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(small, large);
        assert_eq!(small, hash_bytes(&content));
    }

    #[test]
    fn test_tree_hash_sees_renames() {
        let dir = tempfile::TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("sub")).unwrap();
        std::fs::write(tree.join("sub/a.txt"), "alpha").unwrap();
        let before = content_hash(&tree, 16).unwrap();

        std::fs::rename(tree.join("sub/a.txt"), tree.join("sub/b.txt")).unwrap();
        let after = content_hash(&tree, 16).unwrap();
        assert_ne!(before, after, "tree hash should cover relative paths");
    }

    #[test]
    fn test_files_identical() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        std::fs::write(&a, vec![1u8; 5000]).unwrap();
        std::fs::write(&b, vec![1u8; 5000]).unwrap();
        let mut other = vec![1u8; 5000];
        other[4999] = 2;
        std::fs::write(&c, other).unwrap();

        assert!(files_identical(&a, &b, 1024).unwrap());
        assert!(!files_identical(&a, &c, 1024).unwrap());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = full_hash(Path::new("/nonexistent/sweepsafe.bin"), 1024).unwrap_err();
        assert_eq!(err.path, PathBuf::from("/nonexistent/sweepsafe.bin"));
    }
}
