//! Active relay-session accounting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counter of live relay sessions for one rule
#[derive(Debug, Clone, Default)]
pub struct SessionCounter {
    active: Arc<AtomicUsize>,
}

impl SessionCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of live sessions
    pub fn get(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Register a new session
    ///
    /// The count is decremented exactly once, when the returned guard drops.
    pub fn enter(&self) -> SessionGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        SessionGuard {
            active: Arc::clone(&self.active),
        }
    }
}

/// Keeps one session counted for as long as it lives
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Never below zero
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}
