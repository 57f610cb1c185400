//! Pre-flight free-space checks.
//!
//! Before any file is copied into a destination, the orchestrator sums
//! the manifest's total byte count and confirms every destination has
//! enough free space. This replaces a full `sysinfo`-based storage
//! inventory with the one measurement the engine actually needs.

use crate::error::{BackupError, Result};
use std::path::Path;

/// Safety margin added on top of the manifest's total byte count before
/// comparing against a destination's free space, so a run doesn't leave
/// a destination bone dry even if the manifest's size estimate is
/// slightly stale by the time the copy phase reaches the last file.
pub const SPACE_MARGIN_BYTES: u64 = 100 * 1024 * 1024;

/// Below this fraction of a destination's total capacity remaining
/// after a backup, `SpaceGuard::verify_all` logs a warning rather than
/// failing — the run still has enough room, but is cutting it close.
const LOW_SPACE_WARN_FRACTION: f64 = 0.10;

/// Available free space at `path`'s filesystem, in bytes.
#[cfg(unix)]
pub fn available_space(path: &Path) -> Result<u64> {
    let stats = nix::sys::statvfs::statvfs(path).map_err(|errno| {
        BackupError::io(path, std::io::Error::from_raw_os_error(errno as i32))
    })?;
    Ok(stats.blocks_available() as u64 * stats.fragment_size() as u64)
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Result<u64> {
    Err(BackupError::Internal("free-space detection is only implemented for unix".into()))
}

/// Total space at `path`'s filesystem, in bytes.
#[cfg(unix)]
pub fn total_space(path: &Path) -> Result<u64> {
    let stats = nix::sys::statvfs::statvfs(path).map_err(|errno| {
        BackupError::io(path, std::io::Error::from_raw_os_error(errno as i32))
    })?;
    Ok(stats.blocks() as u64 * stats.fragment_size() as u64)
}

#[cfg(not(unix))]
pub fn total_space(_path: &Path) -> Result<u64> {
    Err(BackupError::Internal("free-space detection is only implemented for unix".into()))
}

/// Fail with `BackupError::NoSpace` if `destination` has fewer than
/// `needed` bytes free, plus [`SPACE_MARGIN_BYTES`] of headroom.
pub fn check_space(destination: &Path, needed: u64) -> Result<()> {
    let available = available_space(destination)?;
    let needed_with_margin = needed.saturating_add(SPACE_MARGIN_BYTES);
    if available < needed_with_margin {
        return Err(BackupError::no_space(destination, needed_with_margin, available));
    }
    Ok(())
}

/// Aggregates the pre-flight space check across every destination of a run.
pub struct SpaceGuard;

impl SpaceGuard {
    /// Verify every destination has enough free space for `total_bytes`
    /// plus the safety margin. Returns the first failing destination's
    /// error; callers that want every failure should iterate
    /// destinations themselves. For destinations that pass, also warns
    /// (without failing) when the backup would leave less than 10% of
    /// the destination's total capacity free.
    pub fn verify_all(destinations: &[std::path::PathBuf], total_bytes: u64) -> Result<()> {
        for destination in destinations {
            check_space(destination, total_bytes)?;

            if let Ok(total) = total_space(destination) {
                if total > 0 {
                    if let Ok(available) = available_space(destination) {
                        let post_backup_free = available.saturating_sub(total_bytes);
                        if (post_backup_free as f64) < total as f64 * LOW_SPACE_WARN_FRACTION {
                            tracing::warn!(
                                destination = %destination.display(),
                                "destination will have less than 10% free capacity after this backup"
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn available_space_is_nonzero_on_real_filesystem() {
        let dir = TempDir::new().unwrap();
        let available = available_space(dir.path()).unwrap();
        assert!(available > 0);
    }

    #[test]
    fn check_space_rejects_absurd_requirement() {
        let dir = TempDir::new().unwrap();
        let result = check_space(dir.path(), u64::MAX);
        assert!(matches!(result, Err(BackupError::NoSpace { .. })));
    }

    #[test]
    fn check_space_rejects_a_request_that_only_fits_without_the_margin() {
        let dir = TempDir::new().unwrap();
        let available = available_space(dir.path()).unwrap();
        // Leaves no room for SPACE_MARGIN_BYTES, so this must still fail.
        let result = check_space(dir.path(), available);
        assert!(matches!(result, Err(BackupError::NoSpace { .. })));
    }

    #[test]
    fn total_space_is_at_least_available_space() {
        let dir = TempDir::new().unwrap();
        let total = total_space(dir.path()).unwrap();
        let available = available_space(dir.path()).unwrap();
        assert!(total >= available);
    }
}
