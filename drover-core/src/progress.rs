//! Pluggable progress reporting.
//!
//! Long stages (matrix fetches, pairwise sweeps) report through this trait
//! so callers choose between silence and structured logs without the stages
//! knowing which.

/// Receiver for coarse progress events.
pub trait ProgressReporter: Send + Sync {
    /// A stage with `total` steps is starting.
    fn begin(&self, task: &str, total: usize) {
        let _ = (task, total);
    }

    /// `done` of the announced steps have completed.
    fn advance(&self, done: usize) {
        let _ = done;
    }

    /// The stage finished.
    fn finish(&self, task: &str) {
        let _ = task;
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Reports through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn begin(&self, task: &str, total: usize) {
        log::info!("{task}: starting ({total} steps)");
    }

    fn advance(&self, done: usize) {
        log::debug!("progress: {done} steps done");
    }

    fn finish(&self, task: &str) {
        log::info!("{task}: finished");
    }
}
