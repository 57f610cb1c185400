//! Aggregates per-destination progress into one overall figure.
//!
//! Generalizes [`ProgressReporter`](crate::progress::ProgressReporter)'s
//! single-operation byte/file counters to the N-destination case: each
//! destination reports its own [`DestinationState`] independently, and
//! this collects them into one clamped `[0, 1]` completion fraction.

use crate::core::destination::DestinationState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn state_fraction(state: &DestinationState) -> f64 {
    match state {
        DestinationState::Idle => 0.0,
        DestinationState::Copying { done, total } => {
            // copy phase counts for the first half of a destination's progress
            if *total == 0 {
                0.5
            } else {
                0.5 * (*done as f64 / *total as f64)
            }
        }
        DestinationState::Verifying { done, total } => {
            if *total == 0 {
                1.0
            } else {
                0.5 + 0.5 * (*done as f64 / *total as f64)
            }
        }
        DestinationState::Complete => 1.0,
        DestinationState::Cancelled | DestinationState::Failed(_) => 1.0,
    }
}

/// Tracks every destination's progress and reports one overall fraction
pub struct ProgressAggregator {
    states: Mutex<HashMap<PathBuf, DestinationState>>,
}

impl ProgressAggregator {
    /// Create a tracker for `destinations`, all initially idle
    pub fn new(destinations: &[PathBuf]) -> Self {
        let states = destinations.iter().map(|d| (d.clone(), DestinationState::Idle)).collect();
        Self { states: Mutex::new(states) }
    }

    /// Record a destination's latest state
    pub fn update(&self, destination: &Path, state: DestinationState) {
        self.states.lock().unwrap().insert(destination.to_path_buf(), state);
    }

    /// Overall completion fraction across every destination, clamped to `[0, 1]`
    pub fn overall_progress(&self) -> f64 {
        let states = self.states.lock().unwrap();
        if states.is_empty() {
            return 1.0;
        }
        let sum: f64 = states.values().map(state_fraction).sum();
        (sum / states.len() as f64).clamp(0.0, 1.0)
    }

    /// The destination furthest along, if any have progressed
    pub fn fastest_destination(&self) -> Option<PathBuf> {
        let states = self.states.lock().unwrap();
        states.iter().max_by(|a, b| state_fraction(a.1).total_cmp(&state_fraction(b.1))).map(|(path, _)| path.clone())
    }

    /// Whether every destination has reached a terminal state
    pub fn all_terminal(&self) -> bool {
        self.states
            .lock()
            .unwrap()
            .values()
            .all(|s| matches!(s, DestinationState::Complete | DestinationState::Cancelled | DestinationState::Failed(_)))
    }
}
