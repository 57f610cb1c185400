//! Directory scanner with parallel traversal
//!
//! Walks a source tree, filters by type/extension/cache-folder/hidden
//! rules, and reports every regular file found. Traversal is
//! single-threaded (`walkdir`); the per-entry metadata read is what
//! dominates scan time and that is parallelized with rayon.

use crate::config::{TypeFilter, CACHE_DIR_NAMES};
use crate::error::{BackupError, IoResultExt, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Metadata for a single regular file found under a source root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Path relative to the source root
    pub relative_path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Build a `FileEntry` from an absolute path and its source root
    pub fn from_path(path: &Path, source_root: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).with_path(path)?;
        let relative_path = path.strip_prefix(source_root).unwrap_or(path).to_path_buf();

        Ok(FileEntry {
            path: path.to_path_buf(),
            relative_path,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    /// Lowercase file extension, without the leading dot
    pub fn extension(&self) -> Option<String> {
        self.path.extension().and_then(|e| e.to_str()).map(|s| s.to_lowercase())
    }

    /// Whether this file or any ancestor directory under the source root is hidden (dotfile convention)
    pub fn is_hidden(&self) -> bool {
        self.relative_path
            .components()
            .any(|c| c.as_os_str().to_str().map(|s| s.starts_with('.')).unwrap_or(false))
    }

    /// Whether this file lives under a well-known cache/preview directory
    pub fn is_in_cache_dir(&self) -> bool {
        self.relative_path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .map(|name| CACHE_DIR_NAMES.iter().any(|cache| *cache == name))
                .unwrap_or(false)
        })
    }
}

/// Result of a directory scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root path that was scanned
    pub root: PathBuf,
    /// Every file entry accepted by the scan's filters
    pub files: Vec<FileEntry>,
    /// Sum of `files[].size`
    pub total_size: u64,
    /// Paths skipped because they could not be read, with the reason
    pub errors: Vec<String>,
}

/// Filtering rules applied while walking a source tree
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File type filter
    pub filter: TypeFilter,
    /// Extensions accepted when `filter` is `Custom`
    pub custom_extensions: Vec<String>,
    /// Skip well-known cache/preview directories
    pub exclude_cache: bool,
    /// Skip dotfiles and dot-directories
    pub skip_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            filter: TypeFilter::AllFiles,
            custom_extensions: Vec::new(),
            exclude_cache: true,
            skip_hidden: false,
        }
    }
}

impl ScanConfig {
    fn accepted_extensions(&self) -> Vec<String> {
        if self.filter == TypeFilter::Custom {
            self.custom_extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect()
        } else {
            self.filter.extensions().iter().map(|s| s.to_string()).collect()
        }
    }
}

/// Parallel directory scanner
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    /// Create a new scanner with the given filtering rules
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Scan a directory tree, returning every regular file that passes
    /// this scanner's filters. Symlinks are not followed; non-regular
    /// files (devices, sockets, fifos) are silently skipped.
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        if !root.exists() {
            return Err(BackupError::InvalidPath(format!("source '{}' does not exist", root.display())));
        }
        let root = root.canonicalize().with_path(root)?;
        let accepted_extensions = self.config.accepted_extensions();

        let paths: Vec<PathBuf> = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        let results: Vec<std::result::Result<Option<FileEntry>, String>> = paths
            .into_par_iter()
            .map(|path| {
                let entry = FileEntry::from_path(&path, &root).map_err(|e| e.to_string())?;
                Ok(self.accept(&entry, &accepted_extensions).then_some(entry))
            })
            .collect();

        let mut files = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(Some(entry)) => files.push(entry),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }

        let total_size = files.iter().map(|f| f.size).sum();
        Ok(ScanResult { root, files, total_size, errors })
    }

    fn accept(&self, entry: &FileEntry, accepted_extensions: &[String]) -> bool {
        if self.config.skip_hidden && entry.is_hidden() {
            return false;
        }
        if self.config.exclude_cache && entry.is_in_cache_dir() {
            return false;
        }
        if accepted_extensions.is_empty() {
            return true;
        }
        entry.extension().map(|ext| accepted_extensions.iter().any(|a| *a == ext)).unwrap_or(false)
    }
}
