use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Job-level cancellation, checked between phases.
///
/// Cloning shares the flag. A phase already in flight runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the same handle can run another job.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
