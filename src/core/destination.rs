//! Per-destination copy/verify state machine and worker pool.
//!
//! Every destination gets its own [`PriorityTaskQueue`] and its own
//! pool of OS threads — pools are never shared across destinations, so
//! a slow network share can't starve a fast local disk. The worker
//! loop is the teacher's `spawn_copy_workers` pattern generalized from
//! a single shared queue to one queue per destination and from a
//! plain copy to a quarantine-then-hash-then-fsync-then-rename copy,
//! with bounded retries and a local audit trail alongside it.

use crate::audit::{self, ChecksumEntry, LogRow};
use crate::config::HashAlgorithm;
use crate::core::queue::{CopyTask, PriorityTaskQueue, PRIORITY_HIGH, PRIORITY_NORMAL, SMALL_FILE_THRESHOLD_BYTES};
use crate::core::throughput::ThroughputMonitor;
use crate::error::BackupError;
use crate::events::{Event, EventKind, EventLog, Severity};
use crate::fs::{CopyOptions, CopyOutcome, FileCopier};
use crate::manifest::Manifest;
use crate::safety::CancelSignal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// A single file that failed to copy or verify
#[derive(Debug, Clone)]
pub struct Failure {
    /// Path relative to the source root
    pub relative_path: PathBuf,
    /// What went wrong
    pub error: String,
}

/// Current phase of a destination's work, reported for progress aggregation
#[derive(Debug, Clone)]
pub enum DestinationState {
    /// Waiting to start
    Idle,
    /// Writing files
    Copying { done: usize, total: usize },
    /// Re-reading written files and comparing hashes
    Verifying { done: usize, total: usize },
    /// Finished; see the destination's [`DestinationReport`] for details
    Complete,
    /// Stopped by cooperative cancellation
    Cancelled,
    /// Stopped by an unrecoverable error (destination unreachable or unwritable)
    Failed(String),
}

/// Outcome of running one destination to completion
#[derive(Debug, Clone, Default)]
pub struct DestinationReport {
    /// Files successfully copied and verified
    pub files_copied: usize,
    /// Bytes written
    pub bytes_copied: u64,
    /// Pre-existing files moved aside rather than overwritten
    pub quarantined: Vec<PathBuf>,
    /// Files that failed to copy or failed verification
    pub failures: Vec<Failure>,
}

/// Options bundled together to avoid an unwieldy parameter list on
/// [`DestinationQueue::run`].
#[derive(Clone)]
pub struct DestinationRunOptions {
    /// Hash algorithm used for the manifest's source hashes
    pub algorithm: HashAlgorithm,
    /// Worker cap for a local (non-network-mounted) destination
    pub local_cap: usize,
    /// Whether this destination is network-mounted
    pub is_network_mounted: bool,
    /// Worker cap for a network-mounted destination
    pub network_cap: usize,
    /// Maximum copy attempts per file before giving up (1 = no retries)
    pub max_retries: u8,
    /// Backoff before each retry attempt, indexed by attempt number (0-based)
    pub retry_backoff_ms: [u64; 3],
    /// Single-file copy options
    pub copy_options: CopyOptions,
    /// Central event log to emit per-file events to, if any
    pub event_log: Option<Arc<EventLog>>,
    /// Session this run belongs to
    pub session_id: Uuid,
}

/// One destination's independent copy/verify pipeline
pub struct DestinationQueue {
    root: PathBuf,
    quarantine_root: PathBuf,
    queue: Arc<PriorityTaskQueue>,
    throughput: Arc<ThroughputMonitor>,
    state: Arc<Mutex<DestinationState>>,
}

impl DestinationQueue {
    /// Create a queue rooted at `root`; quarantined files land under
    /// `root/.quarantine`.
    pub fn new(root: PathBuf) -> Self {
        let quarantine_root = root.join(".quarantine");
        Self {
            root,
            quarantine_root,
            queue: Arc::new(PriorityTaskQueue::new()),
            throughput: Arc::new(ThroughputMonitor::new()),
            state: Arc::new(Mutex::new(DestinationState::Idle)),
        }
    }

    /// Snapshot of this destination's current state
    pub fn state(&self) -> DestinationState {
        self.state.lock().unwrap().clone()
    }

    /// Throughput monitor backing this destination's worker-count heuristic
    pub fn throughput(&self) -> &Arc<ThroughputMonitor> {
        &self.throughput
    }

    /// Run the full copy phase then the full verify phase against `manifest`.
    /// Cancellation is checked between tasks and within each file copy.
    /// The initial worker count is recommended by `options`' throughput
    /// heuristic rather than handed in directly.
    pub fn run(&self, manifest: &Manifest, options: &DestinationRunOptions, cancel: CancelSignal) -> DestinationReport {
        if let Some(msg) = self.preflight_writability_check() {
            *self.state.lock().unwrap() = DestinationState::Failed(msg.clone());
            return DestinationReport {
                failures: vec![Failure { relative_path: PathBuf::new(), error: msg }],
                ..Default::default()
            };
        }

        let total = manifest.entries.len();
        *self.state.lock().unwrap() = DestinationState::Copying { done: 0, total };

        for entry in &manifest.entries {
            let priority = if entry.size <= SMALL_FILE_THRESHOLD_BYTES { PRIORITY_HIGH } else { PRIORITY_NORMAL };
            self.queue.push(CopyTask::new(entry.clone(), priority));
        }

        let workers = self.throughput.recommended_workers(options.is_network_mounted, options.network_cap, options.local_cap);

        let quarantined = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let checksums = Arc::new(Mutex::new(Vec::new()));
        let bytes_copied = Arc::new(AtomicU64::new(0));
        let files_done = Arc::new(AtomicUsize::new(0));
        let remaining = Arc::new(AtomicUsize::new(total));

        let handles: Vec<_> = (0..workers.max(1))
            .map(|_| {
                let queue = self.queue.clone();
                let throughput = self.throughput.clone();
                let quarantined = quarantined.clone();
                let failures = failures.clone();
                let checksums = checksums.clone();
                let bytes_copied = bytes_copied.clone();
                let files_done = files_done.clone();
                let remaining = remaining.clone();
                let cancel = cancel.clone();
                let root = self.root.clone();
                let quarantine_root = self.quarantine_root.clone();
                let copy_options = options.copy_options.clone();
                let algorithm = options.algorithm;
                let max_retries = options.max_retries;
                let retry_backoff_ms = options.retry_backoff_ms;
                let event_log = options.event_log.clone();
                let session_id = options.session_id;
                let state = self.state.clone();

                thread::spawn(move || {
                    let copier = FileCopier::new(copy_options);
                    loop {
                        if cancel.is_set() {
                            break;
                        }
                        let task = match queue.pop_timeout(Duration::from_millis(100)) {
                            Some(task) => task,
                            None => {
                                if remaining.load(Ordering::SeqCst) == 0 {
                                    break;
                                }
                                continue;
                            }
                        };

                        let dest_path = root.join(&task.entry.relative_path);
                        let result = copier.copy_with_quarantine(
                            &task.entry.source_path,
                            &dest_path,
                            &task.entry.relative_path,
                            &quarantine_root,
                            algorithm,
                            &task.entry.source_hash,
                            &cancel,
                        );

                        match result {
                            Ok(outcome) => {
                                let (action, hash, quarantine_path) = match &outcome {
                                    CopyOutcome::Skipped { hash } => ("skip", hash.hash.clone(), None),
                                    CopyOutcome::Copied { stats, hash, quarantined: q } => {
                                        bytes_copied.fetch_add(stats.bytes_copied, Ordering::SeqCst);
                                        throughput.record(stats.bytes_copied);
                                        if let Some(q) = q {
                                            quarantined.lock().unwrap().push(q.clone());
                                        }
                                        let action = if q.is_some() { "quarantine" } else { "copy" };
                                        (action, hash.hash.clone(), q.clone())
                                    }
                                };

                                checksums.lock().unwrap().push(ChecksumEntry {
                                    relative_path: task.entry.relative_path.clone(),
                                    hash: hash.clone(),
                                    size: task.entry.size,
                                });

                                let _ = audit::append_log_row(
                                    &root,
                                    &LogRow {
                                        session_id,
                                        action,
                                        source_path: &task.entry.source_path,
                                        dest_path: &dest_path,
                                        hash: &hash,
                                        algo: algorithm.name(),
                                        reason: quarantine_path.as_deref().map(|_| "pre-existing mismatch").unwrap_or(""),
                                    },
                                );

                                if let Some(log) = &event_log {
                                    let kind = match outcome {
                                        CopyOutcome::Skipped { .. } => EventKind::Skip,
                                        CopyOutcome::Copied { quarantined: Some(_), .. } => EventKind::Quarantine,
                                        CopyOutcome::Copied { .. } => EventKind::Copy,
                                    };
                                    log.record(
                                        Event::new(session_id, kind, Severity::Info)
                                            .with_file_path(task.entry.relative_path.clone())
                                            .with_destination_path(root.clone())
                                            .with_size(task.entry.size)
                                            .with_hash(hash),
                                    );
                                }

                                files_done.fetch_add(1, Ordering::SeqCst);
                                finish_task(&remaining, &state, total);
                            }
                            Err(BackupError::Cancelled) => break,
                            Err(e) => {
                                throughput.record_error();
                                if task.attempt + 1 < max_retries {
                                    let backoff_index = (task.attempt as usize).min(retry_backoff_ms.len() - 1);
                                    thread::sleep(Duration::from_millis(retry_backoff_ms[backoff_index]));
                                    queue.push(task.retry());
                                    continue;
                                }

                                if let Some(log) = &event_log {
                                    log.record(
                                        Event::new(session_id, EventKind::Error, Severity::Error)
                                            .with_file_path(task.entry.relative_path.clone())
                                            .with_destination_path(root.clone())
                                            .with_error_msg(e.to_string()),
                                    );
                                }
                                failures.lock().unwrap().push(Failure {
                                    relative_path: task.entry.relative_path.clone(),
                                    error: e.to_string(),
                                });
                                finish_task(&remaining, &state, total);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            let _ = handle.join();
        }

        if cancel.is_set() {
            *self.state.lock().unwrap() = DestinationState::Cancelled;
            return DestinationReport {
                files_copied: files_done.load(Ordering::SeqCst),
                bytes_copied: bytes_copied.load(Ordering::SeqCst),
                quarantined: Arc::try_unwrap(quarantined).unwrap().into_inner().unwrap(),
                failures: Arc::try_unwrap(failures).unwrap().into_inner().unwrap(),
            };
        }

        self.verify(manifest, options.algorithm, &cancel, &failures, &options.event_log, options.session_id);

        let checksums = Arc::try_unwrap(checksums).unwrap().into_inner().unwrap();
        let _ = audit::write_checksum_manifest(&self.root, options.session_id, &checksums);

        *self.state.lock().unwrap() = DestinationState::Complete;
        DestinationReport {
            files_copied: files_done.load(Ordering::SeqCst),
            bytes_copied: bytes_copied.load(Ordering::SeqCst),
            quarantined: Arc::try_unwrap(quarantined).unwrap().into_inner().unwrap(),
            failures: Arc::try_unwrap(failures).unwrap().into_inner().unwrap(),
        }
    }

    /// `Some(message)` if this destination's root cannot be created or
    /// written to; checked once before any file is queued.
    fn preflight_writability_check(&self) -> Option<String> {
        if let Err(e) = std::fs::create_dir_all(&self.root) {
            return Some(format!("cannot create destination directory '{}': {e}", self.root.display()));
        }
        let probe = self.root.join(format!(".vaultmirror-write-probe-{}", Uuid::new_v4()));
        match std::fs::write(&probe, b"") {
            Ok(()) => {
                let _ = std::fs::remove_file(&probe);
                None
            }
            Err(e) => Some(format!("destination '{}' is not writable: {e}", self.root.display())),
        }
    }

    /// Re-read every written file from disk and compare its hash against
    /// the manifest's source hash. Independent of the copy phase's
    /// inline comparison, so a bit flip introduced by the storage layer
    /// between write and verify is still caught. Verify-phase failures
    /// are never retried.
    fn verify(
        &self,
        manifest: &Manifest,
        algorithm: HashAlgorithm,
        cancel: &CancelSignal,
        failures: &Arc<Mutex<Vec<Failure>>>,
        event_log: &Option<Arc<EventLog>>,
        session_id: Uuid,
    ) {
        let total = manifest.entries.len();
        *self.state.lock().unwrap() = DestinationState::Verifying { done: 0, total };

        for (i, entry) in manifest.entries.iter().enumerate() {
            if cancel.is_set() {
                break;
            }
            let dest_path = self.root.join(&entry.relative_path);
            let expected = crate::hash::HashResult::new(algorithm, entry.source_hash.clone(), entry.size);
            match crate::hash::verify_file(&dest_path, &expected, cancel) {
                Ok(true) => {
                    if let Some(log) = event_log {
                        log.record(
                            Event::new(session_id, EventKind::Verify, Severity::Debug)
                                .with_file_path(entry.relative_path.clone())
                                .with_destination_path(self.root.clone())
                                .with_hash(entry.source_hash.clone()),
                        );
                    }
                }
                Ok(false) => {
                    if let Some(log) = event_log {
                        log.record(
                            Event::new(session_id, EventKind::Error, Severity::Error)
                                .with_file_path(entry.relative_path.clone())
                                .with_destination_path(self.root.clone())
                                .with_error_msg("verify-phase hash mismatch"),
                        );
                    }
                    failures.lock().unwrap().push(Failure {
                        relative_path: entry.relative_path.clone(),
                        error: "verify-phase hash mismatch".into(),
                    })
                }
                Err(e) => {
                    if let Some(log) = event_log {
                        log.record(
                            Event::new(session_id, EventKind::Error, Severity::Error)
                                .with_file_path(entry.relative_path.clone())
                                .with_destination_path(self.root.clone())
                                .with_error_msg(e.to_string()),
                        );
                    }
                    failures.lock().unwrap().push(Failure { relative_path: entry.relative_path.clone(), error: e.to_string() })
                }
            }
            *self.state.lock().unwrap() = DestinationState::Verifying { done: i + 1, total };
        }
    }
}

fn finish_task(remaining: &Arc<AtomicUsize>, state: &Arc<Mutex<DestinationState>>, total: usize) {
    let done = remaining.fetch_sub(1, Ordering::SeqCst) - 1;
    *state.lock().unwrap() = DestinationState::Copying { done: total - done, total };
}
