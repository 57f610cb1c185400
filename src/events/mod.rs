//! Durable, append-only event log.
//!
//! Every session emits a stream of events: session start and scan,
//! per-file copy/verify/skip/quarantine, errors, cancellation, and
//! completion. They're written to a small SQLite database by a single dedicated
//! writer thread fed over a channel — the same `recv_timeout` polling
//! loop idiom the copy workers use, generalized from "copy a file" to
//! "batch and flush rows". Non-critical events are batched for
//! throughput; critical events (errors, cancellation, completion) force
//! an immediate flush so a crash right after can't lose them.

mod log;

pub use log::{Event, EventKind, EventLog, Session, SessionStatus, Severity};
