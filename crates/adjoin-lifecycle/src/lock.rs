//! Advisory lock serialising join and refresh runs against one identity.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use adjoin_common::paths;

use crate::error::LifecycleError;

/// Exclusive hold on `lifecycle.lock`. Released on drop.
#[derive(Debug)]
pub struct LifecycleLock {
    file: File,
    path: PathBuf,
}

impl LifecycleLock {
    /// Take the lock without waiting. Contention is `LifecycleError::Locked`.
    pub fn acquire(state_dir: &Path) -> Result<Self, LifecycleError> {
        let path = paths::lock_path(state_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Lifecycle lock acquired");
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(LifecycleError::Locked(path)),
            Err(e) => Err(LifecycleError::State(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LifecycleLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(error = %e, "Failed to release lifecycle lock");
        }
    }
}
