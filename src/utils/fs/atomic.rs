//! Atomic file writes.
//!
//! Every artifact the build writes goes through [`atomic_write`], so a build
//! interrupted half-way never leaves a truncated file whose fresh timestamp
//! would make it look up to date. Content-addressed files (code listings) use
//! [`create_new`], which never replaces an existing file.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use super::dirs::ensure_dir;

/// Write `content` to `path` through a temporary file in the same directory.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    temp.as_file().sync_all().with_context(|| "Failed to sync file to disk")?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Create `path` with `content` unless it already exists.
///
/// Returns `true` when this call created the file and `false` when another
/// writer got there first. The file appears fully written or not at all.
pub fn create_new(path: &Path, content: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    temp.as_file().sync_all().with_context(|| "Failed to sync file to disk")?;

    match temp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error).with_context(|| format!("Failed to create file: {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parent() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("deep").join("nested").join("atomic.txt");

        atomic_write(&file, b"nested content").unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "nested content");
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("atomic.txt");

        atomic_write(&file, b"initial").unwrap();
        atomic_write(&file, b"updated").unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "updated");
    }

    #[test]
    fn test_create_new_keeps_existing() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("listing.rb");

        assert!(create_new(&file, b"puts 1").unwrap());
        assert!(!create_new(&file, b"puts 2").unwrap());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "puts 1");
    }

    #[test]
    fn test_create_new_concurrent_writers() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("shared.txt");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let file = file.clone();
                std::thread::spawn(move || create_new(&file, b"same text").unwrap())
            })
            .collect();
        let created = handles.into_iter().map(|h| h.join().unwrap()).filter(|c| *c).count();

        assert_eq!(created, 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "same text");
        let entries = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
