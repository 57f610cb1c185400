//! Coordinates one backup run end to end: validate inputs, scan and
//! hash the source, pre-flight every destination's free space, run
//! every destination's copy+verify pipeline in parallel, and record
//! the outcome.

use crate::config::{HashAlgorithm, RunConfig};
use crate::core::destination::{DestinationQueue, DestinationRunOptions, DestinationState};
use crate::error::{BackupError, Result};
use crate::events::{Event, EventKind, EventLog, Session, SessionStatus, Severity};
use crate::fs::{CopyOptions, ScanConfig, Scanner};
use crate::manifest::{Manifest, ManifestBuilder};
use crate::progress::ProgressAggregator;
use crate::safety::{self, CancelSignal, DestinationLock, SpaceGuard};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// How often a destination's progress poll thread samples [`DestinationState`]
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Local worker count is capped even on machines with many cores, since
/// beyond this a single destination's disk is almost always the bottleneck.
const MAX_LOCAL_WORKERS: usize = 8;

/// Final outcome of one destination, after the orchestrator has finished
#[derive(Debug, Clone)]
pub struct DestinationOutcome {
    /// Destination root
    pub destination: PathBuf,
    /// Files copied
    pub files_copied: usize,
    /// Bytes copied
    pub bytes_copied: u64,
    /// Pre-existing files moved aside
    pub quarantined: usize,
    /// Files that failed copy or verify
    pub failures: usize,
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Session id this run was recorded under
    pub session_id: Uuid,
    /// Per-destination outcomes, in the order destinations were given
    pub destinations: Vec<DestinationOutcome>,
    /// Whether the run was cancelled before every destination finished
    pub cancelled: bool,
}

impl RunSummary {
    /// Whether every destination finished with zero failures
    pub fn fully_succeeded(&self) -> bool {
        !self.cancelled && self.destinations.iter().all(|d| d.failures == 0)
    }
}

/// Coordinates a single run of the backup engine
pub struct Orchestrator {
    config: RunConfig,
    event_log: Option<Arc<EventLog>>,
}

impl Orchestrator {
    /// Build an orchestrator for `config`, optionally recording events to `event_log`
    pub fn new(config: RunConfig, event_log: Option<Arc<EventLog>>) -> Self {
        Self { config, event_log }
    }

    /// Run the backup, checking `cancel` cooperatively throughout. Builds
    /// its own, internal-only progress aggregator; callers that want to
    /// observe progress concurrently should use [`Orchestrator::run_with_progress`].
    pub fn run(&self, cancel: CancelSignal) -> Result<RunSummary> {
        let progress = Arc::new(ProgressAggregator::new(&self.config.destinations));
        self.run_with_progress(cancel, progress)
    }

    /// Run the backup exactly like [`Orchestrator::run`], but against a
    /// caller-supplied `progress` aggregator. Each destination's state is
    /// pushed to `progress` roughly every 100ms while it runs, so a
    /// caller polling `progress.overall_progress()` concurrently observes
    /// genuine live updates rather than a single value at the end.
    pub fn run_with_progress(&self, cancel: CancelSignal, progress: Arc<ProgressAggregator>) -> Result<RunSummary> {
        let session_id = self.config.options.session_id;

        for destination in &self.config.destinations {
            safety::refuse_if_source_tagged(destination)?;
            refuse_if_destination_is_source(&self.config.source, destination)?;
        }
        let locks: Vec<DestinationLock> =
            self.config.destinations.iter().map(|d| DestinationLock::acquire(d)).collect::<Result<_>>()?;

        if let Some(log) = &self.event_log {
            log.record_session_start(&Session {
                id: session_id,
                source: self.config.source.clone(),
                destinations: self.config.destinations.clone(),
                started_at: Utc::now(),
                completed_at: None,
                status: SessionStatus::InProgress,
            });
        }

        let scanner = Scanner::new(ScanConfig {
            filter: self.config.filter.clone(),
            custom_extensions: self.config.custom_extensions.clone(),
            exclude_cache: self.config.options.exclude_cache,
            skip_hidden: self.config.options.skip_hidden,
        });
        let algorithm = self.config.defaults.hash_algorithm;
        let manifest = ManifestBuilder::new(algorithm).build(&scanner, &self.config.source, &cancel)?;

        if let Some(log) = &self.event_log {
            log.record(
                Event::new(session_id, EventKind::Scan, Severity::Info)
                    .with_size(manifest.total_bytes)
                    .with_metadata(format!("{{\"files\":{}}}", manifest.total_files)),
            );
        }

        SpaceGuard::verify_all(&self.config.destinations, manifest.total_bytes)?;

        let outcomes = self.run_destinations(&manifest, algorithm, &progress, &cancel, session_id);

        let cancelled = cancel.is_set();
        if let Some(log) = &self.event_log {
            log.record(Event::new(
                session_id,
                if cancelled { EventKind::Cancel } else { EventKind::Complete },
                Severity::Info,
            ));
        }

        drop(locks);
        Ok(RunSummary { session_id, destinations: outcomes, cancelled })
    }

    fn run_destinations(
        &self,
        manifest: &Manifest,
        algorithm: HashAlgorithm,
        progress: &Arc<ProgressAggregator>,
        cancel: &CancelSignal,
        session_id: Uuid,
    ) -> Vec<DestinationOutcome> {
        let is_network_mounted = |_: &PathBuf| false; // TODO: detect via mount table once network destinations are supported
        let local_cap = num_cpus::get().clamp(1, MAX_LOCAL_WORKERS);
        let network_cap = self.config.defaults.network_worker_cap;
        let copy_options = CopyOptions::default();

        let handles: Vec<_> = self
            .config
            .destinations
            .iter()
            .cloned()
            .map(|destination| {
                let manifest = manifest.clone();
                let progress = progress.clone();
                let cancel = cancel.clone();
                let event_log = self.event_log.clone();
                let copy_options = copy_options.clone();
                let network_mounted = is_network_mounted(&destination);
                let defaults = self.config.defaults.clone();

                thread::spawn(move || {
                    let queue = Arc::new(DestinationQueue::new(destination.clone()));
                    let stop_polling = Arc::new(AtomicBool::new(false));

                    let poll_handle = {
                        let queue = queue.clone();
                        let progress = progress.clone();
                        let destination = destination.clone();
                        let stop_polling = stop_polling.clone();
                        thread::spawn(move || {
                            while !stop_polling.load(Ordering::SeqCst) {
                                progress.update(&destination, queue.state());
                                thread::sleep(PROGRESS_POLL_INTERVAL);
                            }
                        })
                    };

                    let options = DestinationRunOptions {
                        algorithm,
                        local_cap,
                        is_network_mounted: network_mounted,
                        network_cap,
                        max_retries: defaults.max_retries,
                        retry_backoff_ms: defaults.retry_backoff_ms,
                        copy_options,
                        event_log: event_log.clone(),
                        session_id,
                    };
                    let report = queue.run(&manifest, &options, cancel.clone());

                    stop_polling.store(true, Ordering::SeqCst);
                    let _ = poll_handle.join();
                    progress.update(&destination, queue.state());

                    if let Some(log) = &event_log {
                        let (kind, severity) = match queue.state() {
                            DestinationState::Failed(_) => (EventKind::Error, Severity::Error),
                            _ if !report.failures.is_empty() => (EventKind::Error, Severity::Warn),
                            _ => (EventKind::Complete, Severity::Info),
                        };
                        log.record(
                            Event::new(session_id, kind, severity)
                                .with_destination_path(destination.clone())
                                .with_size(report.bytes_copied)
                                .with_metadata(format!(
                                    "{{\"files\":{},\"failures\":{}}}",
                                    report.files_copied,
                                    report.failures.len()
                                )),
                        );
                    }

                    DestinationOutcome {
                        destination,
                        files_copied: report.files_copied,
                        bytes_copied: report.bytes_copied,
                        quarantined: report.quarantined.len(),
                        failures: report.failures.len(),
                    }
                })
            })
            .collect();

        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    }
}

/// Refuse a run where a destination is the source itself, or an ancestor
/// of it (or vice versa) — canonicalizing both, since either may be
/// reached via a symlink. Destinations that don't exist yet simply can't
/// match an existing source, so a canonicalize failure on the
/// destination side is not itself an error.
fn refuse_if_destination_is_source(source: &std::path::Path, destination: &std::path::Path) -> Result<()> {
    let source = source.canonicalize().map_err(|e| BackupError::io(source, e))?;
    if let Ok(destination) = destination.canonicalize() {
        if destination == source {
            return Err(BackupError::InvalidPath(format!(
                "destination '{}' is the same path as the source",
                destination.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineDefaults, Options, OutputFormat, TypeFilter};
    use std::fs;
    use tempfile::TempDir;

    fn config(source: PathBuf, destinations: Vec<PathBuf>) -> RunConfig {
        RunConfig {
            source,
            destinations,
            filter: TypeFilter::AllFiles,
            custom_extensions: Vec::new(),
            options: Options { exclude_cache: true, skip_hidden: false, organization_name: None, session_id: Uuid::new_v4() },
            defaults: EngineDefaults::default(),
            output_format: OutputFormat::Text,
            quiet: true,
        }
    }

    #[test]
    fn run_copies_to_every_destination() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.bin"), b"alpha").unwrap();

        let dest_a = TempDir::new().unwrap();
        let dest_b = TempDir::new().unwrap();
        let cfg = config(source.path().to_path_buf(), vec![dest_a.path().to_path_buf(), dest_b.path().to_path_buf()]);

        let orchestrator = Orchestrator::new(cfg, None);
        let summary = orchestrator.run(CancelSignal::new()).unwrap();

        assert!(summary.fully_succeeded());
        assert_eq!(summary.destinations.len(), 2);
        assert_eq!(fs::read(dest_a.path().join("a.bin")).unwrap(), b"alpha");
        assert_eq!(fs::read(dest_b.path().join("a.bin")).unwrap(), b"alpha");
    }

    #[test]
    fn run_refuses_a_source_tagged_destination() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.bin"), b"alpha").unwrap();

        let dest = TempDir::new().unwrap();
        safety::tag_as_source(dest.path()).unwrap();
        let cfg = config(source.path().to_path_buf(), vec![dest.path().to_path_buf()]);

        let orchestrator = Orchestrator::new(cfg, None);
        let result = orchestrator.run(CancelSignal::new());
        assert!(matches!(result, Err(BackupError::InvalidPath(_))));
    }

    #[test]
    fn run_refuses_a_destination_that_is_the_source_itself() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.bin"), b"alpha").unwrap();

        let cfg = config(source.path().to_path_buf(), vec![source.path().to_path_buf()]);

        let orchestrator = Orchestrator::new(cfg, None);
        let result = orchestrator.run(CancelSignal::new());
        assert!(matches!(result, Err(BackupError::InvalidPath(_))));
    }
}
