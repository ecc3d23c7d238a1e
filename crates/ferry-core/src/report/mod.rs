//! Presentation sinks for transfer progress and messages.
//!
//! The transfer machinery never prints. It reports through a [`Reporter`],
//! which the CLI implements for the console and headless nodes forward to
//! `tracing`.

use std::sync::Arc;

/// Receives progress and user-facing messages.
///
/// All methods have empty defaults so an implementation only overrides what
/// it displays.
pub trait Reporter: Send + Sync {
    /// Called after chunk `current` of `total` has been handled.
    fn report_progress(&self, _current: u64, _total: u64) {}

    /// Informational message.
    fn report_info(&self, _message: &str) {}

    /// Error message.
    fn report_error(&self, _message: &str) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Forwards reports to `tracing`.
///
/// Per-chunk progress is logged at debug level, messages at info and warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report_progress(&self, current: u64, total: u64) {
        tracing::debug!(current, total, "chunk progress");
    }

    fn report_info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn report_error(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// Shared handle to a reporter.
pub type SharedReporter = Arc<dyn Reporter>;

/// Returns a shared [`NoopReporter`].
#[must_use]
pub fn noop() -> SharedReporter {
    Arc::new(NoopReporter)
}
