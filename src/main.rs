//! vaultmirror CLI - verified multi-destination backup engine

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vaultmirror::config::{CliArgs, Commands, EngineDefaults, OutputFormat, Options, RunConfig};
use vaultmirror::core::Orchestrator;
use vaultmirror::error::{BackupError, Result};
use vaultmirror::events::{EventKind, EventLog};
use vaultmirror::progress::{ProgressAggregator, ProgressReporter};
use vaultmirror::safety::{self, CancelSignal};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    let args = CliArgs::parse();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn run(args: CliArgs) -> Result<i32> {
    let command = args.command.ok_or_else(|| {
        BackupError::InvalidPath("no subcommand given; run `vaultmirror --help`".into())
    })?;

    match command {
        Commands::Run {
            source,
            destinations,
            filter,
            extensions,
            exclude_cache,
            skip_hidden,
            organization_name,
            session_id,
            output_format,
            quiet,
        } => cmd_run(
            source,
            destinations,
            filter,
            extensions,
            exclude_cache,
            skip_hidden,
            organization_name,
            session_id,
            output_format,
            quiet,
        ),
        Commands::TagSource { path } => cmd_tag_source(&path),
        Commands::History { session, anonymize_paths } => cmd_history(session, anonymize_paths),
        Commands::Report { session, format, anonymize_paths } => cmd_report(session, format, anonymize_paths),
    }
}

fn event_log_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".vaultmirror").join("events.db")
}

fn open_event_log() -> Result<EventLog> {
    let path = event_log_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    EventLog::open(&path)
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    source: PathBuf,
    destinations: Vec<PathBuf>,
    filter: vaultmirror::config::TypeFilter,
    extensions: Vec<String>,
    exclude_cache: bool,
    skip_hidden: bool,
    organization_name: Option<String>,
    session_id: Option<Uuid>,
    output_format: OutputFormat,
    quiet: bool,
) -> Result<i32> {
    let defaults_path = PathBuf::from(
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string()),
    )
    .join(".vaultmirror")
    .join("config.toml");
    let defaults = EngineDefaults::load(&defaults_path).unwrap_or_default().with_env_overrides();

    let config = RunConfig {
        source,
        destinations,
        filter,
        custom_extensions: extensions,
        options: Options {
            exclude_cache,
            skip_hidden,
            organization_name: organization_name.or_else(|| defaults.organization_name.clone()),
            session_id: session_id.unwrap_or_else(Uuid::new_v4),
        },
        defaults,
        output_format,
        quiet,
    };

    let cancel = CancelSignal::new();
    let ctrlc_cancel = cancel.clone();
    ctrlc::set_handler(move || ctrlc_cancel.set()).ok();

    let event_log = open_event_log().ok().map(Arc::new);
    let progress = Arc::new(ProgressAggregator::new(&config.destinations));
    let orchestrator = Orchestrator::new(config, event_log);

    let render_handle = if quiet {
        None
    } else {
        let render_progress = progress.clone();
        Some(std::thread::spawn(move || {
            let reporter = ProgressReporter::new();
            while !render_progress.all_terminal() {
                let fraction = render_progress.overall_progress();
                if let Some(fastest) = render_progress.fastest_destination() {
                    reporter.set_status(&format!("{:.0}% — leading: {}", fraction * 100.0, fastest.display()));
                } else {
                    reporter.set_status(&format!("{:.0}%", fraction * 100.0));
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            reporter.finish_success("backup complete");
        }))
    };

    let summary = orchestrator.run_with_progress(cancel, progress)?;
    if let Some(handle) = render_handle {
        let _ = handle.join();
    }

    if !quiet {
        print_summary(&summary, output_format);
    }

    if summary.cancelled {
        Ok(2)
    } else if summary.fully_succeeded() {
        Ok(0)
    } else {
        Ok(1)
    }
}

fn print_summary(summary: &vaultmirror::core::RunSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{{\"session_id\":\"{}\",\"cancelled\":{},\"destinations\":{}}}",
                summary.session_id,
                summary.cancelled,
                summary.destinations.len()
            );
        }
        OutputFormat::Text => {
            println!("Session {}", summary.session_id);
            for dest in &summary.destinations {
                println!(
                    "  {} — {} files, {} quarantined, {} failures",
                    dest.destination.display(),
                    dest.files_copied,
                    dest.quarantined,
                    dest.failures
                );
            }
            if summary.cancelled {
                println!("Run was cancelled.");
            } else if summary.fully_succeeded() {
                println!("All destinations verified successfully.");
            } else {
                println!("Completed with failures; see `vaultmirror report --session {}`", summary.session_id);
            }
        }
    }
}

fn cmd_tag_source(path: &std::path::Path) -> Result<i32> {
    safety::tag_as_source(path)?;
    println!("Tagged '{}' as a source.", path.display());
    Ok(0)
}

fn cmd_history(session: Option<Uuid>, anonymize_paths: bool) -> Result<i32> {
    let log = open_event_log()?;
    let session_id = match session.or_else(|| log.latest_session().ok().flatten()) {
        Some(id) => id,
        None => {
            println!("No sessions recorded yet.");
            return Ok(0);
        }
    };

    for event in log.events_for_session(session_id)? {
        println!("{} {:?} {}", event.timestamp.to_rfc3339(), event.kind, format_event_detail(&event, anonymize_paths));
    }
    Ok(0)
}

fn format_event_detail(event: &vaultmirror::events::Event, anonymize_paths: bool) -> String {
    let mut parts = Vec::new();
    if let Some(path) = &event.file_path {
        let text = path.display().to_string();
        parts.push(if anonymize_paths { anonymize(&text) } else { text });
    }
    if let Some(path) = &event.destination_path {
        let text = path.display().to_string();
        parts.push(if anonymize_paths { anonymize(&text) } else { text });
    }
    if let Some(size) = event.size {
        parts.push(format!("{size} bytes"));
    }
    if let Some(msg) = &event.error_msg {
        parts.push(msg.clone());
    }
    if let Some(metadata) = &event.metadata {
        parts.push(metadata.clone());
    }
    parts.join(" ")
}

fn cmd_report(session: Option<Uuid>, format: OutputFormat, anonymize_paths: bool) -> Result<i32> {
    let log = open_event_log()?;
    let session_id = match session.or_else(|| log.latest_session().ok().flatten()) {
        Some(id) => id,
        None => {
            println!("No sessions recorded yet.");
            return Ok(0);
        }
    };

    let events = log.events_for_session(session_id)?;
    let failures = events.iter().filter(|e| e.kind == EventKind::Error).count();

    match format {
        OutputFormat::Json => {
            println!("{{\"session_id\":\"{session_id}\",\"events\":{},\"failures\":{failures}}}", events.len());
        }
        OutputFormat::Text => {
            println!("Session {session_id}: {} events, {failures} failure(s)", events.len());
            for event in &events {
                println!("  {:?}: {}", event.kind, format_event_detail(event, anonymize_paths));
            }
        }
    }
    Ok(0)
}

fn anonymize(detail: &str) -> String {
    detail.replace(std::env::var("HOME").unwrap_or_default().as_str(), "~")
}
