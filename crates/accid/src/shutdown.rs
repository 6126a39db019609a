//! Process shutdown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Marks the accessibility subsystem as shut down.
///
/// Clones share the flag, and the flag is `Send + Sync`, so the
/// application's shutdown sequencer may set it from any thread. Once set it
/// stays set.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the subsystem as shut down.
    ///
    /// Returns `true` if this call set the flag.
    pub fn mark(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// Check whether the subsystem has been shut down.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

static_assertions::assert_impl_all!(ShutdownSignal: Send, Sync);
