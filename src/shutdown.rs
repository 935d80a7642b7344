//! Process-wide cancellation signal.
//!
//! One flag is created by the runtime and cloned into every worker. Loops
//! poll it at the top of each iteration and at every retry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable shutdown flag. All clones observe the same state.
#[derive(Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every thread to wind down. The first caller's reason is logged.
    pub fn request(&self, reason: &str) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            log::warn!("[RUNTIME] Shutdown requested: {}", reason);
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }
}
