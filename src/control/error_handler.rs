//! Error sink for failures that must not stop the caller.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

use crate::error::TermwireError;

/// Receives errors a session reports and carries on from.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, error: &TermwireError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&TermwireError) + Send + Sync,
{
    fn on_error(&self, error: &TermwireError) {
        self(error)
    }
}

/// Logs every error and counts them.
#[derive(Debug, Default)]
pub struct LoggingErrorHandler {
    errors: AtomicU64,
}

impl LoggingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors seen so far.
    #[inline]
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl ErrorHandler for LoggingErrorHandler {
    fn on_error(&self, err: &TermwireError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        error!(error = %err, "error reported");
    }
}
