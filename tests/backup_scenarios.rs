//! End-to-end engine runs exercising whole-run behavior no single
//! module's unit tests can see: a full source-to-destinations mirror,
//! a verified no-op re-run, conflict quarantining, type filtering,
//! cancellation, and the pre-flight space check.

use std::fs;
use tempfile::TempDir;
use uuid::Uuid;
use vaultmirror::audit;
use vaultmirror::config::{EngineDefaults, Options, OutputFormat, RunConfig, TypeFilter};
use vaultmirror::core::Orchestrator;
use vaultmirror::error::BackupError;
use vaultmirror::events::{EventKind, EventLog};
use vaultmirror::safety::{self, CancelSignal};

fn config(source: &TempDir, destinations: Vec<std::path::PathBuf>, filter: TypeFilter) -> RunConfig {
    RunConfig {
        source: source.path().to_path_buf(),
        destinations,
        filter,
        custom_extensions: Vec::new(),
        options: Options { exclude_cache: true, skip_hidden: false, organization_name: None, session_id: Uuid::new_v4() },
        defaults: EngineDefaults::default(),
        output_format: OutputFormat::Text,
        quiet: true,
    }
}

#[test]
fn fresh_mirror_copies_every_file_to_every_destination() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("a.jpg"), b"helloworld").unwrap();
    fs::create_dir_all(source.path().join("sub")).unwrap();
    fs::write(source.path().join("sub/b.raw"), vec![0u8; 1024 * 1024]).unwrap();
    fs::write(source.path().join("sub/c.xmp"), b"12345678901234567890").unwrap();

    let dest_a = TempDir::new().unwrap();
    let dest_b = TempDir::new().unwrap();
    let cfg = config(&source, vec![dest_a.path().to_path_buf(), dest_b.path().to_path_buf()], TypeFilter::AllFiles);
    let session_id = cfg.options.session_id;

    let orchestrator = Orchestrator::new(cfg, None);
    let summary = orchestrator.run(CancelSignal::new()).unwrap();

    assert_eq!(summary.session_id, session_id);
    assert!(summary.fully_succeeded());
    for dest in [&dest_a, &dest_b] {
        assert_eq!(fs::read(dest.path().join("a.jpg")).unwrap(), b"helloworld");
        assert_eq!(fs::read(dest.path().join("sub/b.raw")).unwrap(), vec![0u8; 1024 * 1024]);
        assert_eq!(fs::read(dest.path().join("sub/c.xmp")).unwrap(), b"12345678901234567890");

        let manifest = audit::read_checksum_manifest(dest.path(), session_id).unwrap();
        assert_eq!(manifest.len(), 3);
    }
}

#[test]
fn rerunning_an_unchanged_tree_only_skips_and_verifies() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("a.jpg"), b"helloworld").unwrap();

    let dest = TempDir::new().unwrap();
    let log_dir = TempDir::new().unwrap();
    let log = EventLog::open(&log_dir.path().join("events.db")).unwrap();

    let first_cfg = config(&source, vec![dest.path().to_path_buf()], TypeFilter::AllFiles);
    Orchestrator::new(first_cfg, Some(std::sync::Arc::new(log))).run(CancelSignal::new()).unwrap();

    let log = EventLog::open(&log_dir.path().join("events2.db")).unwrap();
    let second_cfg = config(&source, vec![dest.path().to_path_buf()], TypeFilter::AllFiles);
    let second_session = second_cfg.options.session_id;
    let log = std::sync::Arc::new(log);
    let summary = Orchestrator::new(second_cfg, Some(log.clone())).run(CancelSignal::new()).unwrap();

    assert!(summary.fully_succeeded());
    let events = log.events_for_session(second_session).unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::Skip));
    assert!(!events.iter().any(|e| e.kind == EventKind::Copy));
    assert!(events.iter().any(|e| e.kind == EventKind::Verify));
}

#[test]
fn a_tampered_destination_file_is_quarantined_and_corrected() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("a.jpg"), b"helloworld").unwrap();

    let dest = TempDir::new().unwrap();
    let first_cfg = config(&source, vec![dest.path().to_path_buf()], TypeFilter::AllFiles);
    Orchestrator::new(first_cfg, None).run(CancelSignal::new()).unwrap();

    fs::write(dest.path().join("a.jpg"), b"tampered").unwrap();

    let second_cfg = config(&source, vec![dest.path().to_path_buf()], TypeFilter::AllFiles);
    let summary = Orchestrator::new(second_cfg, None).run(CancelSignal::new()).unwrap();

    assert!(summary.fully_succeeded());
    assert_eq!(fs::read(dest.path().join("a.jpg")).unwrap(), b"helloworld");

    let quarantine_dir = dest.path().join(".quarantine");
    let quarantined_file = fs::read_dir(&quarantine_dir)
        .unwrap()
        .find_map(|e| e.ok())
        .expect("a quarantined file should exist");
    assert_eq!(fs::read(quarantined_file.path()).unwrap(), b"tampered");
}

#[test]
fn type_filter_excludes_non_matching_files() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("photo.cr2"), b"raw-bytes").unwrap();
    fs::write(source.path().join("video.mov"), b"video-bytes").unwrap();
    fs::write(source.path().join("notes.txt"), b"text").unwrap();

    let dest = TempDir::new().unwrap();
    let cfg = config(&source, vec![dest.path().to_path_buf()], TypeFilter::PhotosOnly);

    let orchestrator = Orchestrator::new(cfg, None);
    let summary = orchestrator.run(CancelSignal::new()).unwrap();

    assert!(summary.fully_succeeded());
    assert!(dest.path().join("photo.cr2").exists());
    assert!(!dest.path().join("video.mov").exists());
    assert!(!dest.path().join("notes.txt").exists());
}

#[test]
fn cancelling_before_copy_starts_leaves_every_destination_cancelled() {
    let source = TempDir::new().unwrap();
    for i in 0..10 {
        fs::write(source.path().join(format!("f{i}.bin")), vec![0u8; 2 * 1024 * 1024]).unwrap();
    }

    let dest_a = TempDir::new().unwrap();
    let dest_b = TempDir::new().unwrap();
    let cfg = config(&source, vec![dest_a.path().to_path_buf(), dest_b.path().to_path_buf()], TypeFilter::AllFiles);

    let cancel = CancelSignal::new();
    cancel.set();

    let orchestrator = Orchestrator::new(cfg, None);
    let summary = orchestrator.run(cancel).unwrap();

    assert!(summary.cancelled);
    assert!(!summary.fully_succeeded());
    // No partial files should be left behind at either destination.
    for dest in [&dest_a, &dest_b] {
        let leftovers: Vec<_> = fs::read_dir(dest.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

#[test]
fn destination_without_enough_free_space_is_refused_before_any_copy() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("a.bin"), b"some bytes").unwrap();

    let dest = TempDir::new().unwrap();
    let available = safety::available_space(dest.path()).unwrap();
    let cfg = config(&source, vec![dest.path().to_path_buf()], TypeFilter::AllFiles);

    // Directly exercise the same pre-flight check the orchestrator runs,
    // asking for more than the destination could ever have free.
    let result = safety::check_space(dest.path(), available.saturating_add(1));
    assert!(matches!(result, Err(BackupError::NoSpace { .. })));

    // And confirm the orchestrator itself still succeeds for a run that
    // legitimately fits, proving the space check isn't rejecting everything.
    let orchestrator = Orchestrator::new(cfg, None);
    assert!(orchestrator.run(CancelSignal::new()).unwrap().fully_succeeded());
}
