//! Cooperative stop signal shared between the control surface and the
//! protocol loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable stop flag.
///
/// Written by the control surface (a UI thread, a stdin watcher), read by
/// the protocol thread at the top of every round and inside every send
/// gap. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the protocol loop wind down.
    #[inline(always)]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
