//! Progress reporting module
//!
//! Provides real-time progress visualization for copy operations
//! with support for multiple bars, ETA calculation, and throughput display,
//! plus an aggregator that rolls per-destination progress into one figure.

mod aggregator;
mod reporter;

pub use aggregator::ProgressAggregator;
pub use reporter::*;
