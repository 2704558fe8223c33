//! Bounding and cancelling long tree sweeps (select all, large cascades).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag a caller flips to stop an in-flight sweep.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-sweep budget. A stopped sweep visits no further directories, but every
/// directory already entered is still re-derived on the way back up.
#[derive(Debug, Clone, Default)]
pub struct SweepControl {
    limit: Option<usize>,
    cancel: CancellationToken,
    visited: usize,
    stopped: bool,
}

impl SweepControl {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        SweepControl {
            limit,
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Account for entering one more directory. Returns `false` once the sweep must stop.
    pub fn enter_directory(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        let over_limit = self.limit.is_some_and(|limit| self.visited >= limit);
        if over_limit || self.cancel.is_cancelled() {
            self.stopped = true;
            return false;
        }
        self.visited += 1;
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn outcome(&self) -> SweepOutcome {
        SweepOutcome {
            directories_visited: self.visited,
            completed: !self.stopped,
        }
    }
}

/// What a sweep managed to do before finishing or being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    pub directories_visited: usize,
    pub completed: bool,
}

impl SweepOutcome {
    pub fn complete() -> Self {
        SweepOutcome {
            directories_visited: 0,
            completed: true,
        }
    }
}
