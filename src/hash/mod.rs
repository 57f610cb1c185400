//! Hash computation and integrity verification module
//!
//! Cryptographic content hashing (BLAKE3, SHA-256) with streaming
//! support for single-pass copy-and-hash operations.

mod integrity;

pub use integrity::*;
