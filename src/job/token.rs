//! One-shot arbitration between a worker and its timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A single-assignment flag shared by the racing parties of one job.
///
/// The first [`try_resolve`](Self::try_resolve) wins; every later call
/// returns `false` and its caller must discard its outcome.
#[derive(Debug, Clone, Default)]
pub struct ResolutionToken(Arc<AtomicBool>);

impl ResolutionToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the token. Returns `true` for exactly one caller.
    pub fn try_resolve(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_resolved(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
