use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use rayon::prelude::*;
use slotrun_core::{Job, Outcome, Result, SlotrunError};
use tracing::{error, info, warn};

use super::Scheduler;

impl Scheduler {
    /// Run every job to completion and return one outcome per job, in input
    /// order.
    ///
    /// Jobs whose GPU demand the pool can never satisfy reject the whole batch
    /// before anything is dispatched. Job failures never abort the batch.
    pub fn run_all(&self, jobs: &[Arc<dyn Job>]) -> Result<Vec<Outcome>> {
        if self.config.debug {
            return self.run_debug(jobs);
        }
        self.admit(jobs)?;

        let total = jobs.len();
        self.write_metrics(|m| m.begin_batch(total));
        self.peak_active.store(0, Ordering::SeqCst);
        if total == 0 {
            self.write_metrics(|m| m.finish_batch(0));
            return Ok(Vec::new());
        }

        info!(jobs = total, max_workers = self.config.max_workers, "starting batch");
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers)
            .thread_name(|i| format!("slotrun-worker-{i}"))
            .build()
            .map_err(|e| SlotrunError::Other(format!("failed to build worker pool: {e}")))?;

        let outcomes: Vec<Outcome> = workers.install(|| {
            jobs.par_iter()
                .enumerate()
                .with_max_len(1)
                .map(|(index, job)| self.submit(job.as_ref(), index, total))
                .collect()
        });

        let peak = self.peak_active.load(Ordering::SeqCst);
        self.write_metrics(|m| m.finish_batch(peak));
        let stats = self.pool.stats();
        if stats.outstanding() != 0 {
            error!(outstanding = stats.outstanding(), "GPU leases left unreleased after batch");
        }
        info!(jobs = total, failed = summarize(&outcomes).len(), "batch finished");
        Ok(outcomes)
    }

    /// Reject jobs that ask for more GPUs than exist.
    pub(super) fn admit(&self, jobs: &[Arc<dyn Job>]) -> Result<()> {
        let available = self.pool.device_count();
        for job in jobs {
            let demand = job.resource_demand();
            if demand > available {
                return Err(SlotrunError::ResourceOveruse {
                    job: job.name().to_string(),
                    demand,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Handle one job on a worker thread. Always yields an outcome, even if
    /// the job's handling panics.
    fn submit(&self, job: &dyn Job, index: usize, total: usize) -> Outcome {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(job, index)))
            .unwrap_or_else(|_| {
                error!(job = job.name(), "worker panicked while running job");
                Outcome::new(job.name(), Outcome::INTERNAL_FAILURE)
            });

        let mut done = 0;
        self.write_metrics(|m| done = m.record_outcome(index, &outcome, started.elapsed()));
        info!(job = %outcome.name, exit_code = outcome.exit_code, "[{done}/{total}] finished");
        outcome
    }

    fn dispatch(&self, job: &dyn Job, index: usize) -> Outcome {
        let lease = match self.pool.acquire(job.resource_demand()) {
            Ok(lease) => lease,
            Err(e) => {
                error!(job = job.name(), error = %e, "could not acquire GPUs");
                return Outcome::new(job.name(), Outcome::INTERNAL_FAILURE);
            }
        };

        if lease.is_empty() {
            info!("launch {} on CPU", job.name());
        } else {
            let ids: Vec<String> = lease.ids().iter().map(|id| id.to_string()).collect();
            info!("launch {} on GPU {}", job.name(), ids.join(","));
        }

        let _active = ActiveJob::enter(&self.active_jobs, &self.peak_active);
        self.executor.execute(job, lease.ids(), index)
    }

    pub(super) fn write_metrics(&self, f: impl FnOnce(&mut crate::metrics::RunMetrics)) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut metrics);
    }
}

/// Counts a running job for the lifetime of the guard.
struct ActiveJob<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveJob<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Log every failed job and return their names.
pub fn summarize(outcomes: &[Outcome]) -> Vec<&str> {
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.name.as_str())
        .collect();
    for outcome in outcomes.iter().filter(|o| !o.is_success()) {
        warn!(job = %outcome.name, exit_code = outcome.exit_code, "job failed");
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_lists_failures() {
        let outcomes = vec![
            Outcome::new("a", 0),
            Outcome::new("b", 7),
            Outcome::new("c", Outcome::SPAWN_FAILURE),
        ];
        assert_eq!(summarize(&outcomes), vec!["b", "c"]);
        assert!(summarize(&[Outcome::new("ok", 0)]).is_empty());
    }

    #[test]
    fn active_guard_tracks_peak() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        {
            let _a = ActiveJob::enter(&active, &peak);
            let _b = ActiveJob::enter(&active, &peak);
            assert_eq!(active.load(Ordering::SeqCst), 2);
        }
        let _c = ActiveJob::enter(&active, &peak);
        assert_eq!(active.load(Ordering::SeqCst), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
