//! Directory creation, removal and file copying.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Create a directory and its parents if missing.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| {
            format!(
                "Failed to create directory: {}\n\nCheck directory permissions and path validity",
                path.display()
            )
        })?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Copy one file, creating the destination's parent directory.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy file from {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Remove a directory tree. Missing directories are not an error.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("a").join("b");
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        ensure_dir(&dir).unwrap();
    }

    #[test]
    fn test_ensure_dir_on_file() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(ensure_dir(&file).is_err());
    }

    #[test]
    fn test_copy_file_creates_parent() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("cover.png");
        std::fs::write(&src, b"png").unwrap();
        let dst = temp.path().join("master").join("images").join("cover.png");

        copy_file(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"png");
    }

    #[test]
    fn test_remove_dir_all_nonexistent() {
        let temp = tempdir().unwrap();
        remove_dir_all(&temp.path().join("missing")).unwrap();
    }
}
