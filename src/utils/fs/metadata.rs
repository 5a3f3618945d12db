//! Modification times for incremental builds.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Modification time of `path`, or `None` when it does not exist.
pub fn modified_time(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(metadata) => {
            let mtime = metadata
                .modified()
                .with_context(|| format!("Failed to read modification time: {}", path.display()))?;
            Ok(Some(mtime))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat: {}", path.display())),
    }
}

/// Newest modification time among `paths`, ignoring missing files.
pub fn newest_modified_time<'a, I>(paths: I) -> Result<Option<SystemTime>>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut newest = None;
    for path in paths {
        if let Some(mtime) = modified_time(path)? {
            newest = Some(newest.map_or(mtime, |n: SystemTime| n.max(mtime)));
        }
    }
    Ok(newest)
}

/// Write a timestamp file recording when a stage last completed.
pub fn touch(path: &Path) -> Result<()> {
    let stamp = chrono::Utc::now().to_rfc3339();
    super::atomic::atomic_write(path, stamp.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_modified_time_missing() {
        let temp = tempdir().unwrap();
        assert!(modified_time(&temp.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_newest_modified_time() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        let old = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs::File::options().write(true).open(&a).unwrap().set_modified(old).unwrap();

        let newest = newest_modified_time([a.as_path(), b.as_path(), temp.path().join("c").as_path()])
            .unwrap()
            .unwrap();
        assert_eq!(newest, modified_time(&b).unwrap().unwrap());
    }

    #[test]
    fn test_touch_writes_timestamp() {
        let temp = tempdir().unwrap();
        let stamp = temp.path().join("build").join("highlights.timestamp");
        touch(&stamp).unwrap();
        assert!(stamp.exists());
    }
}
