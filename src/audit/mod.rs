//! Destination-local audit trail: a daily CSV log and a per-session
//! checksum manifest, written alongside the central SQLite event log.
//!
//! Every destination keeps its own record of what happened to it,
//! independent of the run's central [`EventLog`](crate::events::EventLog):
//! `d/.backuplogs/<date>.csv` is a human-readable append-only ledger,
//! and `d/.backupchecksums/<session_id>.manifest` is the list a later
//! run (or an external tool) can use to confirm exactly what this
//! session copied, without re-reading the whole destination tree.

use crate::error::{BackupError, IoResultExt, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const LOG_DIR: &str = ".backuplogs";
const CHECKSUM_DIR: &str = ".backupchecksums";

/// One row appended to a destination's daily CSV log
pub struct LogRow<'a> {
    /// Session this row belongs to
    pub session_id: Uuid,
    /// What happened: `copy`, `skip`, `quarantine`, `verify`, or `error`
    pub action: &'a str,
    /// Source path the action concerned
    pub source_path: &'a Path,
    /// Destination path the action concerned
    pub dest_path: &'a Path,
    /// Content hash involved, if any
    pub hash: &'a str,
    /// Hash algorithm name
    pub algo: &'a str,
    /// Free-form reason (error text, quarantine cause, etc.)
    pub reason: &'a str,
}

/// Append one row to today's CSV log at `destination/.backuplogs/<date>.csv`,
/// writing the header first if the file doesn't exist yet.
pub fn append_log_row(destination: &Path, row: &LogRow) -> Result<()> {
    let dir = destination.join(LOG_DIR);
    std::fs::create_dir_all(&dir).with_path(&dir)?;
    let path = dir.join(format!("{}.csv", Utc::now().format("%Y-%m-%d")));
    let is_new = !path.exists();

    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path).with_path(&path)?;
    if is_new {
        writeln!(file, "iso_timestamp,session_id,action,source_path,dest_path,hash,algo,reason").with_path(&path)?;
    }
    writeln!(
        file,
        "{},{},{},{},{},{},{},{}",
        Utc::now().to_rfc3339(),
        row.session_id,
        row.action,
        csv_field(&row.source_path.display().to_string()),
        csv_field(&row.dest_path.display().to_string()),
        csv_field(row.hash),
        csv_field(row.algo),
        csv_field(row.reason),
    )
    .with_path(&path)?;
    Ok(())
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One entry in a destination's per-session checksum manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumEntry {
    /// Path relative to the destination root
    pub relative_path: PathBuf,
    /// Content hash of the file as copied
    pub hash: String,
    /// File size in bytes
    pub size: u64,
}

/// Write `destination/.backupchecksums/<session_id>.manifest`: every file
/// this session left at `destination` in a known-good state (copied or
/// skipped because it already matched). Used to round-trip a session's
/// effect on a destination without re-hashing the whole tree.
pub fn write_checksum_manifest(destination: &Path, session_id: Uuid, entries: &[ChecksumEntry]) -> Result<()> {
    let dir = destination.join(CHECKSUM_DIR);
    std::fs::create_dir_all(&dir).with_path(&dir)?;
    let path = dir.join(format!("{session_id}.manifest"));
    let json = serde_json::to_string_pretty(entries).map_err(|e| BackupError::Internal(e.to_string()))?;
    std::fs::write(&path, json).with_path(&path)?;
    Ok(())
}

/// Read back a destination's checksum manifest for `session_id`
pub fn read_checksum_manifest(destination: &Path, session_id: Uuid) -> Result<Vec<ChecksumEntry>> {
    let path = destination.join(CHECKSUM_DIR).join(format!("{session_id}.manifest"));
    let text = std::fs::read_to_string(&path).with_path(&path)?;
    serde_json::from_str(&text).map_err(|e| BackupError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_log_row_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let session_id = Uuid::new_v4();
        let row = LogRow {
            session_id,
            action: "copy",
            source_path: Path::new("/src/a.bin"),
            dest_path: Path::new("/dst/a.bin"),
            hash: "deadbeef",
            algo: "blake3",
            reason: "",
        };
        append_log_row(dir.path(), &row).unwrap();
        append_log_row(dir.path(), &row).unwrap();

        let log_dir = dir.path().join(".backuplogs");
        let entries: Vec<_> = std::fs::read_dir(&log_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let contents = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("iso_timestamp,"));
    }

    #[test]
    fn checksum_manifest_round_trips() {
        let dir = TempDir::new().unwrap();
        let session_id = Uuid::new_v4();
        let entries = vec![
            ChecksumEntry { relative_path: PathBuf::from("a.bin"), hash: "abc".into(), size: 10 },
            ChecksumEntry { relative_path: PathBuf::from("b.bin"), hash: "def".into(), size: 20 },
        ];
        write_checksum_manifest(dir.path(), session_id, &entries).unwrap();

        let read_back = read_checksum_manifest(dir.path(), session_id).unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].relative_path, PathBuf::from("a.bin"));
    }

    #[test]
    fn csv_field_quotes_values_containing_commas() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("plain"), "plain");
    }
}
