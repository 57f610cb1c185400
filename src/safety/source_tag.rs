//! Source tagging: a marker file that lets a folder declare "I am a
//! source, never copy into me", so an operator cannot accidentally
//! point a backup run at a camera card or a working project folder as
//! a destination.

use crate::error::{BackupError, IoResultExt, Result};
use std::path::Path;

/// Marker file name written at the root of a tagged source folder
pub const SOURCE_TAG_FILE_NAME: &str = ".vaultmirror_source";

/// Tag `path` as a source. Idempotent: tagging an already-tagged folder
/// succeeds silently.
pub fn tag_as_source(path: &Path) -> Result<()> {
    let marker = path.join(SOURCE_TAG_FILE_NAME);
    std::fs::write(&marker, b"vaultmirror source marker\n").with_path(&marker)?;
    Ok(())
}

/// Refuse to proceed if `path` carries a source tag. Every destination
/// is checked against this before the run begins.
pub fn refuse_if_source_tagged(path: &Path) -> Result<()> {
    if path.join(SOURCE_TAG_FILE_NAME).exists() {
        return Err(BackupError::InvalidPath(format!(
            "'{}' is tagged as a source and cannot be used as a destination",
            path.display()
        )));
    }
    Ok(())
}
