use crate::{job::JobStatus, registry::JobHandle};

/// Receives coarse progress from a stage collaborator.
pub trait ProgressSink: Send + Sync {
    /// `percent` is the completion of the current stage, `detail` a short
    /// human-readable description of the current sub-step.
    fn report(&self, percent: u8, detail: &str);
}

/// Forwards a stage collaborator's progress to the job it runs for.
pub struct StageProgress<'a> {
    handle: &'a JobHandle,
    stage: JobStatus,
}

impl<'a> StageProgress<'a> {
    pub fn new(handle: &'a JobHandle, stage: JobStatus) -> Self {
        Self { handle, stage }
    }
}

impl ProgressSink for StageProgress<'_> {
    fn report(&self, percent: u8, detail: &str) {
        if let Err(e) = self.handle.report_progress(percent, detail) {
            tracing::warn!(job_id = %self.handle.id(), stage = %self.stage, error = %e, "Dropped progress update");
        }
    }
}

/// Integer percentage of `done` out of `total`, clamped to `0..=100`.
pub fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * 100) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 10), 0);
        assert_eq!(percent_of(3, 10), 30);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(10, 10), 100);
        assert_eq!(percent_of(12, 10), 100);
        assert_eq!(percent_of(1, 0), 0);
    }
}
