//! Priority task queue feeding a destination's copy workers.
//!
//! Generalizes the sorted-`Vec` scheduling the teacher used (smallest
//! file first) into a genuine max-heap keyed by a blended score: an
//! explicit priority band, a bonus for small files (so small files
//! finish quickly and free up a worker), and a bonus for files that
//! have sat unmodified the longest. Ties break by insertion order so
//! two equally-scored tasks still come out FIFO.

use crate::manifest::ManifestEntry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Normal priority band: the default for any file at or above
/// [`SMALL_FILE_THRESHOLD_BYTES`]
pub const PRIORITY_NORMAL: u8 = 0;
/// High priority band: applied to files under [`SMALL_FILE_THRESHOLD_BYTES`]
/// so quick wins front-load ahead of large files
pub const PRIORITY_HIGH: u8 = 5;
/// Files at or under this size are scheduled at [`PRIORITY_HIGH`]
pub const SMALL_FILE_THRESHOLD_BYTES: u64 = 1024 * 1024;
/// Score bonus applied per retry attempt, large enough to outrank any
/// plausible priority-band/size/age combination so a retried file is
/// serviced before fresh work.
const RETRY_ESCALATION: f64 = 10_000.0;

/// One file queued for copy to a single destination
#[derive(Debug, Clone)]
pub struct CopyTask {
    /// The manifest entry to copy
    pub entry: ManifestEntry,
    /// Explicit priority band (0 = normal, higher = more urgent)
    pub priority: u8,
    /// Number of prior failed attempts at this task (0 on first try)
    pub attempt: u8,
    /// Monotonic insertion order, used to break score ties FIFO
    enqueued_at: Instant,
    /// Precomputed score; see module docs for the formula
    score: f64,
}

impl CopyTask {
    /// Build a task for `entry`, scoring it immediately
    pub fn new(entry: ManifestEntry, priority: u8) -> Self {
        Self::scored(entry, priority, 0)
    }

    /// Requeue this task after a failed attempt: bumps `attempt` and
    /// escalates its score so the retry is serviced ahead of fresh work.
    pub fn retry(self) -> Self {
        Self::scored(self.entry, self.priority, self.attempt + 1)
    }

    fn scored(entry: ManifestEntry, priority: u8, attempt: u8) -> Self {
        let size_mb = (entry.size as f64 / (1024.0 * 1024.0)).max(1.0);
        let age_seconds = SystemTime::now().duration_since(entry.modified).unwrap_or_default().as_secs_f64();
        let score = priority as f64 * 1000.0 + 100.0 / size_mb + age_seconds / 10.0 + attempt as f64 * RETRY_ESCALATION;

        Self { entry, priority, attempt, enqueued_at: Instant::now(), score }
    }

    /// This task's scheduling score
    pub fn score(&self) -> f64 {
        self.score
    }
}

impl PartialEq for CopyTask {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.enqueued_at == other.enqueued_at
    }
}
impl Eq for CopyTask {}

impl PartialOrd for CopyTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CopyTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
    }
}

/// Thread-safe max-heap of pending copy tasks, with a blocking pop for
/// workers that should sleep rather than spin when the queue drains.
pub struct PriorityTaskQueue {
    heap: Mutex<BinaryHeap<CopyTask>>,
    available: Condvar,
}

impl Default for PriorityTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityTaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self { heap: Mutex::new(BinaryHeap::new()), available: Condvar::new() }
    }

    /// Push a task and wake one waiting worker
    pub fn push(&self, task: CopyTask) {
        let mut heap = self.heap.lock().unwrap();
        heap.push(task);
        self.available.notify_one();
    }

    /// Pop the highest-scored task without blocking
    pub fn pop(&self) -> Option<CopyTask> {
        self.heap.lock().unwrap().pop()
    }

    /// Pop the highest-scored task, waiting up to `timeout` for one to
    /// arrive. Workers loop calling this and checking their cancellation
    /// flag between calls, mirroring the 100ms `recv_timeout` poll used
    /// elsewhere in the engine.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<CopyTask> {
        let mut heap = self.heap.lock().unwrap();
        if let Some(task) = heap.pop() {
            return Some(task);
        }
        let (mut heap, _) = self.available.wait_timeout(heap, timeout).unwrap();
        heap.pop()
    }

    /// Number of tasks currently queued
    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    /// Whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;
    use std::path::PathBuf;

    fn entry(size: u64) -> ManifestEntry {
        ManifestEntry {
            relative_path: PathBuf::from("f"),
            source_path: PathBuf::from("/f"),
            size,
            modified: SystemTime::now(),
            source_hash: "hash".into(),
            hash_algorithm: HashAlgorithm::Blake3,
        }
    }

    #[test]
    fn higher_priority_band_pops_first() {
        let queue = PriorityTaskQueue::new();
        queue.push(CopyTask::new(entry(1024), 0));
        queue.push(CopyTask::new(entry(1024), 5));
        let first = queue.pop().unwrap();
        assert_eq!(first.priority, 5);
    }

    #[test]
    fn smaller_file_outranks_larger_file_at_same_priority() {
        let queue = PriorityTaskQueue::new();
        queue.push(CopyTask::new(entry(100 * 1024 * 1024), 0));
        queue.push(CopyTask::new(entry(1024), 0));
        let first = queue.pop().unwrap();
        assert_eq!(first.entry.size, 1024);
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue = PriorityTaskQueue::new();
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn retry_increments_attempt_and_outranks_fresh_tasks() {
        let queue = PriorityTaskQueue::new();
        let retried = CopyTask::new(entry(1024), PRIORITY_NORMAL).retry();
        assert_eq!(retried.attempt, 1);

        queue.push(CopyTask::new(entry(1024), PRIORITY_HIGH));
        queue.push(retried);
        let first = queue.pop().unwrap();
        assert_eq!(first.attempt, 1);
    }

    #[test]
    fn small_file_threshold_matches_one_mebibyte() {
        assert_eq!(SMALL_FILE_THRESHOLD_BYTES, 1024 * 1024);
    }
}
