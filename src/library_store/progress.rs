/// Receives progress of long batch operations and lets the caller cancel
/// them. Cancellation is polled between batches.
pub trait ProgressMonitor {
    fn on_progress(&mut self, stage: &str, done: u64, total: u64);

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Monitor that ignores progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressMonitor for NoProgress {
    fn on_progress(&mut self, _stage: &str, _done: u64, _total: u64) {}
}
