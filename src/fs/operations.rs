//! Low-level file copy primitives.
//!
//! The copy engine's single-file operation: stream source bytes into a
//! temporary `.partial` file while hashing them, fsync the data and the
//! containing directory, then atomically rename into place. Anything
//! already sitting at the destination path is moved into a quarantine
//! folder first; nothing at a destination is ever deleted.

use crate::error::{BackupError, IoResultExt, Result};
use crate::hash::{HashResult, Hasher};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options controlling a single-file copy
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Read/write buffer size, in bytes
    pub buffer_size: usize,
    /// Preallocate the destination file with `set_len` before writing
    pub preallocate: bool,
    /// Copy the Unix permission bits
    pub preserve_permissions: bool,
    /// Copy the source modification time
    pub preserve_mtime: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: crate::hash::BLOCK_SIZE,
            preallocate: true,
            preserve_permissions: true,
            preserve_mtime: true,
        }
    }
}

/// Statistics about a completed copy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyStats {
    /// Bytes written to the destination
    pub bytes_copied: u64,
    /// Wall-clock time spent copying
    pub duration: Duration,
}

impl CopyStats {
    /// Throughput in bytes/second; zero if duration was zero
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        }
    }
}

/// Trait for hash writers that can receive streaming data
pub trait HashWriter {
    /// Update the hash with more data
    fn update(&mut self, data: &[u8]);
}

/// Outcome of a durable, hashed copy attempt
pub enum CopyOutcome {
    /// The destination already held content matching the expected hash;
    /// nothing was written or moved.
    Skipped {
        /// The destination's existing (matching) hash
        hash: HashResult,
    },
    /// Bytes were written to the destination
    Copied {
        /// Copy statistics
        stats: CopyStats,
        /// Content hash of the bytes written
        hash: HashResult,
        /// Path a pre-existing file at the destination was moved to, if any
        quarantined: Option<PathBuf>,
    },
}

impl CopyOutcome {
    /// The hash of the file now sitting at the destination, whichever
    /// branch produced it.
    pub fn hash(&self) -> &HashResult {
        match self {
            Self::Skipped { hash } | Self::Copied { hash, .. } => hash,
        }
    }
}

/// A reusable single-file copier
#[derive(Clone)]
pub struct FileCopier {
    options: CopyOptions,
}

impl FileCopier {
    /// Create a copier with the given options
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Copy `source` to `dest`.
    ///
    /// If `dest` already exists and its content hash equals
    /// `expected_hash`, nothing is written or moved and this returns
    /// `CopyOutcome::Skipped` — re-running against an unchanged tree is
    /// therefore a no-op rather than a repeated quarantine-and-copy.
    /// Otherwise any pre-existing file at `dest` is quarantined into
    /// `quarantine_root` (preserving `relative` as the quarantine's
    /// sub-path) before the new content is written, hashed, fsynced (the
    /// data and its parent directory), and atomically renamed into
    /// place. `cancel` is checked once per buffer-sized block.
    pub fn copy_with_quarantine(
        &self,
        source: &Path,
        dest: &Path,
        relative: &Path,
        quarantine_root: &Path,
        algorithm: crate::config::HashAlgorithm,
        expected_hash: &str,
        cancel: &crate::safety::CancelSignal,
    ) -> Result<CopyOutcome> {
        let start = std::time::Instant::now();

        let parent = dest.parent().ok_or_else(|| BackupError::InvalidPath(format!("'{}' has no parent", dest.display())))?;
        std::fs::create_dir_all(parent).with_path(parent)?;

        let quarantined = if dest.exists() {
            let existing_hash = crate::hash::hash_file(dest, algorithm, cancel)?;
            if existing_hash.hash == expected_hash {
                return Ok(CopyOutcome::Skipped { hash: existing_hash });
            }
            Some(quarantine_existing(dest, quarantine_root, relative)?)
        } else {
            None
        };

        let partial = parent.join(format!(
            ".{}.partial",
            dest.file_name().and_then(|n| n.to_str()).unwrap_or("vaultmirror")
        ));

        let (stats, hash) = self.write_partial(source, &partial, algorithm, cancel)?;

        if self.options.preserve_permissions {
            self.copy_permissions(source, &partial)?;
        }
        if self.options.preserve_mtime {
            self.copy_mtime(source, &partial)?;
        }

        std::fs::rename(&partial, dest).with_path(dest)?;
        sync_directory(parent)?;

        Ok(CopyOutcome::Copied {
            stats: CopyStats { bytes_copied: stats.bytes_copied, duration: start.elapsed() },
            hash,
            quarantined,
        })
    }

    fn write_partial(
        &self,
        source: &Path,
        partial: &Path,
        algorithm: crate::config::HashAlgorithm,
        cancel: &crate::safety::CancelSignal,
    ) -> Result<(CopyStats, HashResult)> {
        let src_file = File::open(source).with_path(source)?;
        let size = src_file.metadata().with_path(source)?.len();
        let dst_file = OpenOptions::new().write(true).create(true).truncate(true).open(partial).with_path(partial)?;
        if self.options.preallocate && size > 0 {
            let _ = dst_file.set_len(size);
        }

        let mut reader = BufReader::with_capacity(self.options.buffer_size, src_file);
        let mut writer = BufWriter::with_capacity(self.options.buffer_size, dst_file);
        let mut hasher = Hasher::new(algorithm);
        let mut buffer = vec![0u8; self.options.buffer_size];
        let mut bytes_copied = 0u64;

        loop {
            if cancel.is_set() {
                return Err(BackupError::Cancelled);
            }

            let bytes_read = reader.read(&mut buffer).map_err(|e| BackupError::io(source, e))?;
            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
            writer.write_all(&buffer[..bytes_read]).map_err(|e| BackupError::io(partial, e))?;
            bytes_copied += bytes_read as u64;
        }

        writer.flush().with_path(partial)?;
        writer.get_ref().sync_all().with_path(partial)?;

        let hash = HashResult::new(algorithm, hasher.finalize(), bytes_copied);
        Ok((CopyStats { bytes_copied, duration: Duration::default() }, hash))
    }

    fn copy_permissions(&self, source: &Path, dest: &Path) -> Result<()> {
        let metadata = std::fs::metadata(source).with_path(source)?;
        std::fs::set_permissions(dest, metadata.permissions()).with_path(dest)?;
        Ok(())
    }

    fn copy_mtime(&self, source: &Path, dest: &Path) -> Result<()> {
        let metadata = std::fs::metadata(source).with_path(source)?;
        let mtime = filetime::FileTime::from_last_modification_time(&metadata);
        filetime::set_file_mtime(dest, mtime).map_err(|e| BackupError::io(dest, e))?;
        Ok(())
    }
}

/// Move a pre-existing destination file into `quarantine_root`, keeping
/// its relative path and appending a timestamp to avoid collisions.
/// Falls back to copy-then-remove when the quarantine root is on a
/// different filesystem (rename would fail with `EXDEV`).
pub fn quarantine_existing(existing: &Path, quarantine_root: &Path, relative: &Path) -> Result<PathBuf> {
    let timestamp = humantime::format_rfc3339_seconds(std::time::SystemTime::now()).to_string().replace(':', "-");
    let file_name = relative.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    let target_dir = quarantine_root.join(relative.parent().unwrap_or_else(|| Path::new("")));
    std::fs::create_dir_all(&target_dir).with_path(&target_dir)?;
    let target = target_dir.join(format!("{timestamp}__{file_name}"));

    match std::fs::rename(existing, &target) {
        Ok(()) => Ok(target),
        Err(_) => {
            std::fs::copy(existing, &target).with_path(&target)?;
            std::fs::remove_file(existing).with_path(existing)?;
            Ok(target)
        }
    }
}

/// fsync a directory so a preceding create/rename within it is durable
pub fn sync_directory(dir: &Path) -> Result<()> {
    let dir_file = File::open(dir).with_path(dir)?;
    dir_file.sync_all().with_path(dir)?;
    Ok(())
}

/// Compare file sizes as a cheap post-copy sanity check (the real
/// integrity check is the verify phase's content hash)
pub fn verify_copy_size(source: &Path, dest: &Path) -> Result<bool> {
    let src_meta = std::fs::metadata(source).with_path(source)?;
    let dst_meta = std::fs::metadata(dest).with_path(dest)?;
    Ok(src_meta.len() == dst_meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;
    use crate::safety::CancelSignal;
    use tempfile::TempDir;

    #[test]
    fn copy_with_quarantine_moves_existing_file_aside_on_mismatch() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        std::fs::write(&source, b"new content").unwrap();
        let expected = crate::hash::hash_bytes(b"new content", HashAlgorithm::Blake3);

        let dest = dir.path().join("dest").join("a.bin");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"old content").unwrap();

        let quarantine_root = dir.path().join(".quarantine");
        let copier = FileCopier::new(CopyOptions::default());
        let cancel = CancelSignal::new();
        let outcome = copier
            .copy_with_quarantine(&source, &dest, Path::new("a.bin"), &quarantine_root, HashAlgorithm::Blake3, &expected.hash, &cancel)
            .unwrap();

        match outcome {
            CopyOutcome::Copied { quarantined, .. } => {
                assert!(quarantined.is_some());
                assert_eq!(std::fs::read(&dest).unwrap(), b"new content");
                assert_eq!(std::fs::read(quarantined.unwrap()).unwrap(), b"old content");
            }
            CopyOutcome::Skipped { .. } => panic!("expected a quarantine-and-copy, not a skip"),
        }
    }

    #[test]
    fn copy_with_quarantine_skips_when_destination_already_matches() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        std::fs::write(&source, b"same content").unwrap();
        let expected = crate::hash::hash_bytes(b"same content", HashAlgorithm::Blake3);

        let dest = dir.path().join("dest").join("a.bin");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"same content").unwrap();
        let dest_mtime_before = std::fs::metadata(&dest).unwrap().modified().unwrap();

        let quarantine_root = dir.path().join(".quarantine");
        let copier = FileCopier::new(CopyOptions::default());
        let cancel = CancelSignal::new();
        let outcome = copier
            .copy_with_quarantine(&source, &dest, Path::new("a.bin"), &quarantine_root, HashAlgorithm::Blake3, &expected.hash, &cancel)
            .unwrap();

        assert!(matches!(outcome, CopyOutcome::Skipped { .. }));
        assert_eq!(std::fs::metadata(&dest).unwrap().modified().unwrap(), dest_mtime_before);
        assert!(!quarantine_root.exists());
    }

    #[test]
    fn copy_with_quarantine_hashes_written_bytes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        std::fs::write(&source, b"hello world").unwrap();
        let dest = dir.path().join("dest.bin");
        let expected = crate::hash::hash_bytes(b"hello world", HashAlgorithm::Blake3);

        let copier = FileCopier::new(CopyOptions::default());
        let cancel = CancelSignal::new();
        let outcome = copier
            .copy_with_quarantine(&source, &dest, Path::new("dest.bin"), &dir.path().join(".quarantine"), HashAlgorithm::Blake3, &expected.hash, &cancel)
            .unwrap();

        match outcome {
            CopyOutcome::Copied { hash, quarantined, .. } => {
                assert_eq!(hash.hash, expected.hash);
                assert!(quarantined.is_none());
            }
            CopyOutcome::Skipped { .. } => panic!("destination did not exist; should have copied"),
        }
    }

    #[test]
    fn copy_with_quarantine_honors_cancellation() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        std::fs::write(&source, vec![0u8; crate::hash::BLOCK_SIZE * 3]).unwrap();
        let dest = dir.path().join("dest.bin");

        let copier = FileCopier::new(CopyOptions::default());
        let cancel = CancelSignal::new();
        cancel.set();
        let result =
            copier.copy_with_quarantine(&source, &dest, Path::new("dest.bin"), &dir.path().join(".quarantine"), HashAlgorithm::Blake3, "irrelevant", &cancel);
        assert!(matches!(result, Err(BackupError::Cancelled)));
    }
}
