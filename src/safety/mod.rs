//! Safety primitives: cooperative cancellation, source/destination
//! validation, pre-flight space checks, and destination locking.
//!
//! Grounded on the shutdown-flag idiom used throughout the scheduler and
//! worker-spawn code (`Arc<AtomicBool>` checked at block/iteration
//! boundaries), generalized here into a single shared type so every
//! subsystem (hasher, scanner, copy engine, destination queues) can hold
//! a clone of the same flag.

mod lock;
mod source_tag;
mod space_guard;

pub use lock::DestinationLock;
pub use source_tag::{refuse_if_source_tagged, tag_as_source, SOURCE_TAG_FILE_NAME};
pub use space_guard::{available_space, check_space, SpaceGuard};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cooperative-cancellation flag. Cloning is cheap (an `Arc`
/// bump); every long-running loop in the engine holds one and checks
/// `is_set()` between blocks of at most 1 MiB of I/O.
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Create a fresh, unset signal
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signal_shares_state_across_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_set());
        signal.set();
        assert!(clone.is_set());
    }
}
