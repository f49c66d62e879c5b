//! Search epochs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one search request. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// Epoch before any search has started.
    pub const INITIAL: Epoch = Epoch(0);

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lock-free counter naming the current search epoch.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    current: AtomicU64,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances to and returns a fresh epoch.
    pub fn next_epoch(&self) -> Epoch {
        Epoch(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Latest epoch handed out.
    pub fn current(&self) -> Epoch {
        Epoch(self.current.load(Ordering::Acquire))
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current() == epoch
    }
}
