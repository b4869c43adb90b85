use tokio::time::Instant;

use crate::errors::{UploadError, UploadStep};

/// Records which upload steps a run has reached, and logs each transition.
#[derive(Debug)]
pub struct StepTracker {
    run_id: String,
    started: Instant,
    step_started: Instant,
    current: Option<UploadStep>,
    completed: Vec<UploadStep>,
    failure: Option<(UploadStep, String)>,
}

/// Summary of an upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub run_id: String,
    pub files_attached: usize,
    pub completed_steps: Vec<UploadStep>,
}

impl StepTracker {
    pub fn new(run_id: &str) -> Self {
        let now = Instant::now();
        Self {
            run_id: run_id.to_string(),
            started: now,
            step_started: now,
            current: None,
            completed: Vec::new(),
            failure: None,
        }
    }

    /// Mark the start of `step`.
    pub fn begin(&mut self, step: UploadStep) {
        self.current = Some(step);
        self.step_started = Instant::now();
        log::debug!("[{}] Starting step: {}", self.run_id, step);
    }

    /// Mark the step started by [`begin`](Self::begin) as done.
    pub fn complete(&mut self) {
        if let Some(step) = self.current.take() {
            log::info!(
                "[{}] Step done: {} ({} ms)",
                self.run_id,
                step,
                self.step_started.elapsed().as_millis()
            );
            self.completed.push(step);
        }
    }

    /// Record the failure of the current step and return it.
    pub fn fail(&mut self, error: &UploadError) -> UploadStep {
        let step = self.current.take().unwrap_or(UploadStep::Launched);
        log::error!(
            "[{}] Step failed: {} after {} ms: {}",
            self.run_id,
            step,
            self.step_started.elapsed().as_millis(),
            error
        );
        self.failure = Some((step, error.to_string()));
        step
    }

    pub fn completed_steps(&self) -> &[UploadStep] {
        &self.completed
    }

    #[cfg(test)]
    pub fn failure(&self) -> Option<&(UploadStep, String)> {
        self.failure.as_ref()
    }

    pub fn finish(self, files_attached: usize) -> UploadReport {
        match &self.failure {
            Some((step, error)) => log::error!(
                "[{}] Upload run failed at '{}' after {:.1}s: {}",
                self.run_id,
                step,
                self.started.elapsed().as_secs_f64(),
                error
            ),
            None => log::info!(
                "[{}] Upload run finished in {:.1}s: {} file(s) submitted",
                self.run_id,
                self.started.elapsed().as_secs_f64(),
                files_attached
            ),
        }

        UploadReport {
            run_id: self.run_id,
            files_attached,
            completed_steps: self.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_steps_are_recorded_in_order() {
        let mut tracker = StepTracker::new("run-1");
        tracker.begin(UploadStep::Launched);
        tracker.complete();
        tracker.begin(UploadStep::Navigated);
        tracker.complete();

        assert_eq!(
            tracker.completed_steps(),
            &[UploadStep::Launched, UploadStep::Navigated]
        );
        assert!(tracker.failure().is_none());
    }

    #[test]
    fn failure_reports_the_current_step() {
        let mut tracker = StepTracker::new("run-2");
        tracker.begin(UploadStep::Launched);
        tracker.complete();
        tracker.begin(UploadStep::FileChooserOpened);

        let step = tracker.fail(&UploadError::FileChooserTimeout { timeout_ms: 10_000 });

        assert_eq!(step, UploadStep::FileChooserOpened);
        assert_eq!(tracker.completed_steps(), &[UploadStep::Launched]);

        let report = tracker.finish(0);
        assert_eq!(report.run_id, "run-2");
        assert_eq!(report.completed_steps, vec![UploadStep::Launched]);
    }

    #[test]
    fn complete_without_begin_is_ignored() {
        let mut tracker = StepTracker::new("run-3");
        tracker.complete();
        assert!(tracker.completed_steps().is_empty());
    }
}
