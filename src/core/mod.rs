//! Core engine module
//!
//! The priority task queue, per-destination worker pools and state
//! machine, throughput-based worker sizing, and the orchestrator that
//! ties them together into one backup run.

pub mod destination;
mod orchestrator;
mod queue;
mod throughput;

pub use destination::{DestinationQueue, DestinationReport, DestinationRunOptions, DestinationState, Failure};
pub use orchestrator::{DestinationOutcome, Orchestrator, RunSummary};
pub use queue::{CopyTask, PriorityTaskQueue, PRIORITY_HIGH, PRIORITY_NORMAL, SMALL_FILE_THRESHOLD_BYTES};
pub use throughput::ThroughputMonitor;
