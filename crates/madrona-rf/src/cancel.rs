//! Cooperative cancellation for in-flight training runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A clonable cancellation flag shared between a training run and its caller.
///
/// Tree fits check the token between node expansions, so a set token drains
/// the worker pool within the time of a single node expansion per worker
/// rather than waiting for whole trees to finish. Cancelled training surfaces
/// as [`crate::ForestError::Cancelled`], never as a partial model.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; safe to call from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Return `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
