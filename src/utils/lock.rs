//! Build directory locking.
//!
//! Two builds writing into the same build directory would race on every
//! artifact, so a build takes an exclusive advisory lock on
//! `<build>/.quire.lock` for its whole duration and a second build fails fast
//! with [`QuireError::BuildLocked`]. The lock is released when the guard is
//! dropped.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::core::QuireError;

/// Lock file name inside the build directory.
pub const LOCK_FILE_NAME: &str = ".quire.lock";

/// Guard holding the exclusive build lock.
#[derive(Debug)]
pub struct BuildLock {
    _file: Arc<File>,
    lock_path: PathBuf,
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        debug!(path = %self.lock_path.display(), "Build lock released");
        if let Err(e) = std::fs::remove_file(&self.lock_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!(path = %self.lock_path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

impl BuildLock {
    /// Take the lock on `build_dir`, creating the directory if needed.
    pub async fn acquire(build_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(build_dir)
            .await
            .with_context(|| format!("Failed to create build directory: {}", build_dir.display()))?;

        let lock_path = build_dir.join(LOCK_FILE_NAME);
        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .with_context(|| "spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        let file = Arc::new(file);
        let lock_file = Arc::clone(&file);
        let acquired = tokio::task::spawn_blocking(move || lock_file.try_lock_exclusive())
            .await
            .with_context(|| "spawn_blocking panicked")?
            .with_context(|| format!("Failed to lock: {}", lock_path.display()))?;

        if !acquired {
            return Err(QuireError::BuildLocked {
                path: lock_path.display().to_string(),
            }
            .into());
        }

        debug!(path = %lock_path.display(), "Build lock acquired");
        Ok(Self {
            _file: file,
            lock_path,
        })
    }
}
