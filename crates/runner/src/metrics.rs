use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use slotrun_core::Outcome;

/// Counters for one batch run, also used to drive progress reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    /// Jobs submitted in the current batch.
    pub total_jobs: usize,
    /// Jobs that reached a terminal outcome.
    pub completed: usize,
    /// Completed jobs with a non-zero exit code.
    pub failed: usize,
    /// Highest number of jobs running at once.
    pub peak_active: usize,
    /// Wall-clock duration by input position; `None` until the job finishes.
    /// Keyed by position because job names need not be unique.
    pub durations: Vec<Option<Duration>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunMetrics {
    /// Reset for a new batch of `total` jobs.
    pub fn begin_batch(&mut self, total: usize) {
        *self = Self {
            total_jobs: total,
            durations: vec![None; total],
            started_at: Some(Utc::now()),
            ..Self::default()
        };
    }

    /// Record the job at input position `index`. Returns how many jobs are
    /// done so far.
    pub fn record_outcome(&mut self, index: usize, outcome: &Outcome, duration: Duration) -> usize {
        self.completed += 1;
        if !outcome.is_success() {
            self.failed += 1;
        }
        if index >= self.durations.len() {
            self.durations.resize(index + 1, None);
        }
        self.durations[index] = Some(duration);
        self.completed
    }

    /// Duration of the job at input position `index`, once it finished.
    pub fn duration_of(&self, index: usize) -> Option<Duration> {
        self.durations.get(index).copied().flatten()
    }

    pub fn finish_batch(&mut self, peak_active: usize) {
        self.peak_active = peak_active;
        self.finished_at = Some(Utc::now());
    }

    /// Batch wall-clock time, once finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_failures() {
        let mut m = RunMetrics::default();
        m.begin_batch(3);
        assert_eq!(m.record_outcome(0, &Outcome::new("a", 0), Duration::from_millis(5)), 1);
        assert_eq!(m.record_outcome(2, &Outcome::new("b", 2), Duration::from_millis(7)), 2);

        assert_eq!(m.total_jobs, 3);
        assert_eq!(m.completed, 2);
        assert_eq!(m.failed, 1);
        assert_eq!(m.duration_of(2), Some(Duration::from_millis(7)));
        assert_eq!(m.duration_of(1), None);
    }

    #[test]
    fn duplicate_names_keep_separate_durations() {
        let mut m = RunMetrics::default();
        m.begin_batch(2);
        m.record_outcome(1, &Outcome::new("eval", 0), Duration::from_millis(9));
        m.record_outcome(0, &Outcome::new("eval", 0), Duration::from_millis(3));

        assert_eq!(m.duration_of(0), Some(Duration::from_millis(3)));
        assert_eq!(m.duration_of(1), Some(Duration::from_millis(9)));
    }

    #[test]
    fn begin_batch_resets_previous_run() {
        let mut m = RunMetrics::default();
        m.begin_batch(1);
        m.record_outcome(0, &Outcome::new("a", 1), Duration::ZERO);
        m.finish_batch(1);
        assert!(m.elapsed().is_some());

        m.begin_batch(2);
        assert_eq!(m.completed, 0);
        assert_eq!(m.failed, 0);
        assert_eq!(m.durations, vec![None, None]);
        assert!(m.elapsed().is_none());
    }
}
