//! Content hashing and integrity verification
//!
//! Supports BLAKE3 (default) and SHA-256, both cryptographic and both
//! producing a 256-bit digest. Hashing is streamed in fixed-size blocks
//! so memory use stays constant regardless of file size, and a shared
//! cancellation flag is checked between blocks so a hash of a very large
//! file can be aborted promptly.

use crate::config::HashAlgorithm;
use crate::error::{BackupError, IoResultExt, Result};
use crate::fs::HashWriter;
use crate::safety::CancelSignal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Default streaming block size: 1 MiB, per the cancellation granularity
/// callers rely on (`CancelSignal` is checked at most once per block).
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Hash result as hex string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashResult {
    /// The hash algorithm used
    pub algorithm: HashAlgorithm,
    /// Hash value as lowercase hex string
    pub hash: String,
    /// File size in bytes
    pub size: u64,
}

impl HashResult {
    /// Create a new hash result
    pub fn new(algorithm: HashAlgorithm, hash: String, size: u64) -> Self {
        Self { algorithm, hash, size }
    }

    /// Verify against another hash result
    pub fn verify(&self, other: &HashResult) -> bool {
        self.algorithm == other.algorithm && self.hash == other.hash
    }
}

impl std::fmt::Display for HashResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

/// Unified hasher over the supported cryptographic algorithms
pub enum Hasher {
    /// BLAKE3
    Blake3(blake3::Hasher),
    /// SHA-256
    Sha256(sha2::Sha256),
}

impl Hasher {
    /// Create a new hasher for the given algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => Self::Blake3(blake3::Hasher::new()),
            HashAlgorithm::Sha256 => {
                use sha2::Digest;
                Self::Sha256(sha2::Sha256::new())
            }
        }
    }

    /// Get the algorithm this hasher uses
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Blake3(_) => HashAlgorithm::Blake3,
            Self::Sha256(_) => HashAlgorithm::Sha256,
        }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Sha256(h) => {
                use sha2::Digest;
                h.update(data);
            }
        }
    }

    /// Finalize and get the hash as hex string
    pub fn finalize(self) -> String {
        match self {
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::Sha256(h) => {
                use sha2::Digest;
                hex::encode(h.finalize())
            }
        }
    }
}

impl HashWriter for Hasher {
    fn update(&mut self, data: &[u8]) {
        Hasher::update(self, data);
    }
}

/// Compute hash of a file, checking `cancel` between blocks.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm, cancel: &CancelSignal) -> Result<HashResult> {
    hash_file_with_buffer(path, algorithm, BLOCK_SIZE, cancel)
}

/// Compute hash of a file with a custom buffer size.
pub fn hash_file_with_buffer(
    path: &Path,
    algorithm: HashAlgorithm,
    buffer_size: usize,
    cancel: &CancelSignal,
) -> Result<HashResult> {
    let file = File::open(path).with_path(path)?;
    let size = file.metadata().with_path(path)?.len();
    let mut reader = BufReader::with_capacity(buffer_size, file);
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; buffer_size];

    loop {
        if cancel.is_set() {
            return Err(BackupError::Cancelled);
        }

        let bytes_read = reader.read(&mut buffer).map_err(|e| BackupError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(HashResult::new(algorithm, hasher.finalize(), size))
}

/// Compute hash of data already in memory (used by tests and small manifests)
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> HashResult {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    HashResult::new(algorithm, hasher.finalize(), data.len() as u64)
}

/// Verify file integrity against an expected hash
pub fn verify_file(path: &Path, expected: &HashResult, cancel: &CancelSignal) -> Result<bool> {
    let actual = hash_file(path, expected.algorithm, cancel)?;
    Ok(actual.verify(expected))
}

/// Hash multiple files in parallel (used by the verify phase, which hashes
/// one destination's files concurrently with copy/verify of other destinations)
pub fn hash_files_parallel(
    paths: &[&Path],
    algorithm: HashAlgorithm,
    cancel: &CancelSignal,
) -> Vec<Result<HashResult>> {
    paths.par_iter().map(|path| hash_file(path, algorithm, cancel)).collect()
}

/// Streaming hasher for copy-and-hash operations, used by the copy engine
/// to compute a destination's hash in the same pass as the byte copy.
pub struct StreamingHasher {
    hasher: Hasher,
    bytes_processed: u64,
}

impl StreamingHasher {
    /// Create a new streaming hasher
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            hasher: Hasher::new(algorithm),
            bytes_processed: 0,
        }
    }

    /// Process a chunk of data
    pub fn process(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    /// Bytes processed so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// Finalize and get the result
    pub fn finalize(self) -> HashResult {
        let algorithm = self.hasher.algorithm();
        HashResult::new(algorithm, self.hasher.finalize(), self.bytes_processed)
    }
}

impl HashWriter for StreamingHasher {
    fn update(&mut self, data: &[u8]) {
        self.process(data);
    }
}
