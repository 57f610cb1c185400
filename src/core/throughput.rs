//! Rolling throughput measurement used to size a destination's worker pool.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(10);
const GROWTH_THRESHOLD: f64 = 1.15;
const DROP_THRESHOLD: f64 = 0.80;
const ERROR_RATE_THRESHOLD: f64 = 0.05;
const STARTING_WORKERS: usize = 2;
const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 8;
const NETWORK_CAP: usize = 2;

struct AdaptiveState {
    current_workers: usize,
    last_window_bps: f64,
    growth_streak: u8,
    window_started_at: Instant,
    ops_in_window: u64,
    errors_in_window: u64,
}

impl AdaptiveState {
    fn new() -> Self {
        Self {
            current_workers: STARTING_WORKERS,
            last_window_bps: 0.0,
            growth_streak: 0,
            window_started_at: Instant::now(),
            ops_in_window: 0,
            errors_in_window: 0,
        }
    }
}

/// Tracks bytes copied over a rolling window and recommends a worker
/// count from the observed rate, the way the copy engine decides
/// whether adding another worker is still paying off.
///
/// The heuristic: start at 2 workers; grow by 1 when a window's
/// throughput beats the prior window by at least 15% for two
/// consecutive windows; shrink by 1 when throughput drops at least 20%
/// or the window's error rate is at least 5%. Network-mounted
/// destinations are always capped at 2 regardless of observed
/// throughput, since extra workers there usually saturate a link
/// rather than improve local I/O.
pub struct ThroughputMonitor {
    samples: Mutex<VecDeque<(Instant, u64)>>,
    state: Mutex<AdaptiveState>,
}

impl Default for ThroughputMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputMonitor {
    /// Create a monitor with an empty window
    pub fn new() -> Self {
        Self { samples: Mutex::new(VecDeque::new()), state: Mutex::new(AdaptiveState::new()) }
    }

    /// Record that `bytes` were just copied
    pub fn record(&self, bytes: u64) {
        let mut samples = self.samples.lock().unwrap();
        let now = Instant::now();
        samples.push_back((now, bytes));
        while let Some((ts, _)) = samples.front() {
            if now.duration_since(*ts) > WINDOW {
                samples.pop_front();
            } else {
                break;
            }
        }
        drop(samples);
        let mut state = self.state.lock().unwrap();
        state.ops_in_window += 1;
    }

    /// Record that a copy attempt in the current window failed. Counted
    /// toward the error-rate shrink trigger alongside successful ops.
    pub fn record_error(&self) {
        let mut state = self.state.lock().unwrap();
        state.ops_in_window += 1;
        state.errors_in_window += 1;
    }

    /// Bytes/second averaged over the current window; zero if the
    /// window has fewer than two samples or spans no measurable time.
    pub fn bytes_per_second(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        if samples.len() < 2 {
            return 0.0;
        }
        let total_bytes: u64 = samples.iter().map(|(_, b)| b).sum();
        let elapsed = samples.back().unwrap().0.duration_since(samples.front().unwrap().0).as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            total_bytes as f64 / elapsed
        }
    }

    /// Worker count this destination should run with right now.
    ///
    /// Network-mounted destinations are capped low regardless of
    /// observed throughput. Otherwise, once a full window has elapsed
    /// since the last adjustment, the window's throughput and error
    /// rate are compared against the prior window and `current_workers`
    /// grows, shrinks, or holds accordingly, clamped to `[1, 8]` and to
    /// the caller-supplied `local_cap`.
    pub fn recommended_workers(&self, is_network_mounted: bool, network_cap: usize, local_cap: usize) -> usize {
        if is_network_mounted {
            return network_cap.clamp(MIN_WORKERS, NETWORK_CAP);
        }

        let current_bps = self.bytes_per_second();
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let upper_bound = local_cap.max(MIN_WORKERS).min(MAX_WORKERS);

        if now.duration_since(state.window_started_at) >= WINDOW {
            let error_rate =
                if state.ops_in_window > 0 { state.errors_in_window as f64 / state.ops_in_window as f64 } else { 0.0 };

            if state.last_window_bps > 0.0 && current_bps >= state.last_window_bps * GROWTH_THRESHOLD {
                state.growth_streak += 1;
                if state.growth_streak >= 2 {
                    state.current_workers = (state.current_workers + 1).min(upper_bound);
                    state.growth_streak = 0;
                }
            } else {
                state.growth_streak = 0;
            }

            let should_shrink = error_rate >= ERROR_RATE_THRESHOLD
                || (state.last_window_bps > 0.0 && current_bps <= state.last_window_bps * DROP_THRESHOLD);
            if should_shrink {
                state.current_workers = state.current_workers.saturating_sub(1).max(MIN_WORKERS);
            }

            state.last_window_bps = current_bps;
            state.ops_in_window = 0;
            state.errors_in_window = 0;
            state.window_started_at = now;
        }

        state.current_workers.clamp(MIN_WORKERS, upper_bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_monitor_reports_zero_throughput() {
        let monitor = ThroughputMonitor::new();
        assert_eq!(monitor.bytes_per_second(), 0.0);
    }

    #[test]
    fn network_mounted_destinations_use_the_network_cap() {
        let monitor = ThroughputMonitor::new();
        assert_eq!(monitor.recommended_workers(true, 2, 8), 2);
    }

    #[test]
    fn network_cap_never_exceeds_two() {
        let monitor = ThroughputMonitor::new();
        assert_eq!(monitor.recommended_workers(true, 6, 8), 2);
    }

    #[test]
    fn fresh_monitor_recommends_the_starting_worker_count() {
        let monitor = ThroughputMonitor::new();
        assert_eq!(monitor.recommended_workers(false, 2, 8), STARTING_WORKERS);
    }

    #[test]
    fn recommendation_never_exceeds_local_cap() {
        let monitor = ThroughputMonitor::new();
        assert_eq!(monitor.recommended_workers(false, 2, 1), 1);
    }

    #[test]
    fn recording_accumulates_within_window() {
        let monitor = ThroughputMonitor::new();
        monitor.record(1000);
        monitor.record(2000);
        let samples = monitor.samples.lock().unwrap();
        let total: u64 = samples.iter().map(|(_, b)| b).sum();
        assert_eq!(total, 3000);
    }

    #[test]
    fn high_error_rate_shrinks_worker_count_after_a_window() {
        let monitor = ThroughputMonitor::new();
        {
            let mut state = monitor.state.lock().unwrap();
            state.current_workers = 4;
            state.window_started_at = Instant::now() - WINDOW - Duration::from_secs(1);
            state.ops_in_window = 10;
            state.errors_in_window = 5;
        }
        let recommended = monitor.recommended_workers(false, 2, 8);
        assert_eq!(recommended, 3);
    }

    #[test]
    fn sustained_growth_increments_worker_count_after_two_windows() {
        let monitor = ThroughputMonitor::new();
        {
            let mut samples = monitor.samples.lock().unwrap();
            let t0 = Instant::now() - Duration::from_secs(5);
            samples.push_back((t0, 1_000_000));
            samples.push_back((t0 + Duration::from_secs(1), 1_000_000));
        }
        {
            let mut state = monitor.state.lock().unwrap();
            state.current_workers = 2;
            state.last_window_bps = 1.0;
            state.growth_streak = 1;
            state.window_started_at = Instant::now() - WINDOW - Duration::from_secs(1);
        }
        let recommended = monitor.recommended_workers(false, 2, 8);
        assert_eq!(recommended, 3);
    }
}
