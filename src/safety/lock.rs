//! Destination lock file: prevents two concurrent runs from writing
//! into the same destination at once.

use crate::error::{BackupError, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = ".vaultmirror.lock";

/// A held lock on one destination directory. The lock file is removed
/// when this guard drops, whether the run succeeded, failed, or panicked.
pub struct DestinationLock {
    path: PathBuf,
}

impl DestinationLock {
    /// Acquire the lock for `destination`, failing if another run already
    /// holds it.
    pub fn acquire(destination: &Path) -> Result<Self> {
        let path = destination.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    BackupError::InvalidPath(format!(
                        "destination '{}' is locked by another run",
                        destination.display()
                    ))
                } else {
                    BackupError::io(&path, e)
                }
            })?;

        let _ = writeln!(file, "pid={}", std::process::id());
        Ok(Self { path })
    }
}

impl Drop for DestinationLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
