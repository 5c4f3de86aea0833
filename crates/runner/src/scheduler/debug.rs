use std::sync::Arc;
use std::time::Instant;

use slotrun_core::{Job, Outcome, Result};
use tracing::info;

use super::Scheduler;

impl Scheduler {
    /// Run jobs one at a time on the calling thread with output on the
    /// terminal. The slot pool and worker pool are not used.
    ///
    /// An in-process job that fails stops the run and its error is returned.
    pub fn run_debug(&self, jobs: &[Arc<dyn Job>]) -> Result<Vec<Outcome>> {
        self.write_metrics(|m| m.begin_batch(jobs.len()));
        let mut outcomes = Vec::with_capacity(jobs.len());

        for (index, job) in jobs.iter().enumerate() {
            info!(job = job.name(), "running in debug mode");
            let started = Instant::now();
            let exit_code = self.executor.run_attached(job.as_ref())?;
            let outcome = Outcome::new(job.name(), exit_code);
            self.write_metrics(|m| {
                m.record_outcome(index, &outcome, started.elapsed());
            });
            outcomes.push(outcome);
        }

        self.write_metrics(|m| m.finish_batch(if jobs.is_empty() { 0 } else { 1 }));
        Ok(outcomes)
    }
}
