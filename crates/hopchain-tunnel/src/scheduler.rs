//! Session-count driven chain refresh cadence.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts forwarding sessions and reports when a chain refresh is due.
///
/// Concurrent callers may observe the same boundary more than once in a
/// burst; an occasional duplicate refresh is acceptable.
#[derive(Debug)]
pub struct ReconnectScheduler {
    counter: AtomicU64,
    every: u64,
}

impl ReconnectScheduler {
    /// Refresh once every `every` sessions; `0` never refreshes.
    pub fn new(every: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            every,
        }
    }

    pub fn every(&self) -> u64 {
        self.every
    }

    /// Sessions recorded so far.
    pub fn sessions(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Record one session; returns `true` when it lands on a refresh boundary.
    pub fn record(&self) -> bool {
        let count = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        self.every != 0 && count % self.every == 0
    }
}

impl Default for ReconnectScheduler {
    fn default() -> Self {
        Self::new(hopchain_core::DEFAULT_RECONNECT_EVERY)
    }
}
