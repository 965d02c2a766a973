//! Cooperative cancellation for multi-lookup operations.
//!
//! # Responsibility
//! - Let callers abort descendant expansion and graph traversals that may
//!   issue many store round-trips.
//!
//! # Invariants
//! - Engines check the token before each additional round-trip and stop
//!   issuing lookups once it is cancelled.
//! - The token is an explicit injected value, never module-level state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag, cheap to clone across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; observed by all clones.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
