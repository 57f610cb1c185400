//! Error types for the backup engine
//!
//! This module defines the closed error taxonomy used throughout the
//! engine, plus small helpers for attaching path context to I/O errors.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for backup engine operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Unexpected filesystem error
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination does not have enough free space for the run
    #[error("Insufficient space at '{destination}': need {needed} bytes, have {available} bytes")]
    NoSpace {
        destination: PathBuf,
        needed: u64,
        available: u64,
    },

    /// Access denied
    #[error("Permission denied: {0}")]
    Permission(PathBuf),

    /// A relative path escaped its destination root, or could not be represented
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Verify-phase content hash did not match the manifest entry
    #[error("Hash mismatch for '{relative}' at destination '{destination}'")]
    HashMismatch { relative: String, destination: String },

    /// A manifest entry's source file disappeared between scan and copy
    #[error("Source file missing: {0}")]
    SourceMissing(PathBuf),

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// An invariant was violated; always reported, never swallowed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackupError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a hash mismatch error
    pub fn hash_mismatch(relative: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::HashMismatch {
            relative: relative.into(),
            destination: destination.into(),
        }
    }

    /// Create a no-space error
    pub fn no_space(destination: impl Into<PathBuf>, needed: u64, available: u64) -> Self {
        Self::NoSpace {
            destination: destination.into(),
            needed,
            available,
        }
    }

    /// Whether a copy-phase retry makes sense for this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Whether this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::Permission(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::NoSpace { destination, .. } => Some(destination),
            Self::Permission(path) => Some(path),
            Self::SourceMissing(path) => Some(path),
            _ => None,
        }
    }

    /// The exit-status-relevant category this error maps to
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 2,
            Self::NoSpace { .. } | Self::InvalidPath(_) => 3,
            Self::Internal(_) => 4,
            _ => 1,
        }
    }
}

/// Result type alias for backup engine operations
pub type Result<T> = std::result::Result<T, BackupError>;

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        BackupError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| BackupError::io(path, e))
    }
}
