//! Source manifest: the list of files a run intends to copy, each
//! already carrying its source content hash so every destination's
//! verify phase can check against the same value without re-reading
//! the source.

use crate::config::HashAlgorithm;
use crate::error::Result;
use crate::fs::{ScanResult, Scanner};
use crate::hash::hash_file;
use crate::safety::CancelSignal;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// One file the manifest tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the source root; used to place the file at every destination
    pub relative_path: PathBuf,
    /// Absolute source path at scan time
    pub source_path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Source modification time
    pub modified: SystemTime,
    /// Source content hash, computed once and reused by every destination's verify phase
    pub source_hash: String,
    /// Algorithm used to compute `source_hash`
    pub hash_algorithm: HashAlgorithm,
}

/// The full set of files one run will copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Source root this manifest was built from
    pub source_root: PathBuf,
    /// When the manifest was built
    pub created: DateTime<Utc>,
    /// Every tracked file
    pub entries: Vec<ManifestEntry>,
    /// `entries.len()`
    pub total_files: usize,
    /// Sum of `entries[].size`
    pub total_bytes: u64,
}

impl Manifest {
    /// Iterate entries in deterministic relative-path order
    pub fn sorted_entries(&self) -> Vec<&ManifestEntry> {
        let mut entries: Vec<&ManifestEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        entries
    }
}

/// Builds a [`Manifest`] by scanning a source tree and hashing every
/// accepted file in parallel.
pub struct ManifestBuilder {
    algorithm: HashAlgorithm,
}

impl ManifestBuilder {
    /// Create a builder that hashes with `algorithm`
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Scan `source_root` with `scanner` and hash every accepted file,
    /// checking `cancel` between files. The first hashing error or
    /// cancellation aborts the whole build.
    pub fn build(&self, scanner: &Scanner, source_root: &std::path::Path, cancel: &CancelSignal) -> Result<Manifest> {
        let scan: ScanResult = scanner.scan(source_root)?;
        self.build_from_scan(scan, cancel)
    }

    /// Build a manifest from an already-completed scan
    pub fn build_from_scan(&self, scan: ScanResult, cancel: &CancelSignal) -> Result<Manifest> {
        let algorithm = self.algorithm;
        let entries: Result<Vec<ManifestEntry>> = scan
            .files
            .into_par_iter()
            .map(|file| {
                let hash = hash_file(&file.path, algorithm, cancel)?;
                Ok(ManifestEntry {
                    relative_path: file.relative_path,
                    source_path: file.path,
                    size: file.size,
                    modified: file.modified,
                    source_hash: hash.hash,
                    hash_algorithm: algorithm,
                })
            })
            .collect();
        let mut entries = entries?;
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let total_files = entries.len();
        let total_bytes = entries.iter().map(|e| e.size).sum();

        Ok(Manifest {
            source_root: scan.root,
            created: Utc::now(),
            entries,
            total_files,
            total_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::ScanConfig;
    use tempfile::TempDir;

    #[test]
    fn build_hashes_every_scanned_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"alpha").unwrap();
        std::fs::write(dir.path().join("b.bin"), b"beta").unwrap();

        let scanner = Scanner::new(ScanConfig::default());
        let builder = ManifestBuilder::new(HashAlgorithm::Blake3);
        let cancel = CancelSignal::new();
        let manifest = builder.build(&scanner, dir.path(), &cancel).unwrap();

        assert_eq!(manifest.total_files, 2);
        assert_eq!(manifest.total_bytes, 9);
        for entry in &manifest.entries {
            let expected = crate::hash::hash_file(&entry.source_path, HashAlgorithm::Blake3, &cancel).unwrap();
            assert_eq!(entry.source_hash, expected.hash);
        }
    }

    #[test]
    fn sorted_entries_are_in_relative_path_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("z.bin"), b"z").unwrap();
        std::fs::write(dir.path().join("a.bin"), b"a").unwrap();

        let scanner = Scanner::new(ScanConfig::default());
        let builder = ManifestBuilder::new(HashAlgorithm::Blake3);
        let manifest = builder.build(&scanner, dir.path(), &CancelSignal::new()).unwrap();

        let sorted = manifest.sorted_entries();
        assert_eq!(sorted[0].relative_path, PathBuf::from("a.bin"));
        assert_eq!(sorted[1].relative_path, PathBuf::from("z.bin"));
    }
}
