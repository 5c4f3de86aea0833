use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotrunError};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_opt(key).map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

// ── Scheduler ─────────────────────────────────────────────────

/// Scheduler configuration, typically parsed from the `[scheduler]` table of
/// a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently in-flight jobs.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Capacity seeded for every visible GPU id.
    #[serde(default = "default_max_workers_per_gpu")]
    pub max_workers_per_gpu: usize,
    /// Run jobs sequentially with output on the terminal.
    #[serde(default)]
    pub debug: bool,
    /// Back-off between acquire attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Directory holding per-job temporary config files.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Device visibility variable read at discovery and set on every child.
    #[serde(default = "default_visible_devices_var")]
    pub visible_devices_var: String,
}

fn default_max_workers() -> usize { 16 }
fn default_max_workers_per_gpu() -> usize { 1 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_scratch_dir() -> PathBuf { PathBuf::from("tmp") }
fn default_visible_devices_var() -> String { "CUDA_VISIBLE_DEVICES".to_string() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_workers_per_gpu: default_max_workers_per_gpu(),
            debug: false,
            poll_interval_ms: default_poll_interval_ms(),
            scratch_dir: default_scratch_dir(),
            visible_devices_var: default_visible_devices_var(),
        }
    }
}

impl SchedulerConfig {
    /// Overlay `SLOTRUN_*` environment variables (call `load_dotenv()` first).
    /// Unparseable values are ignored.
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_parse("SLOTRUN_MAX_WORKERS") {
            self.max_workers = v;
        }
        if let Some(v) = env_parse("SLOTRUN_MAX_WORKERS_PER_GPU") {
            self.max_workers_per_gpu = v;
        }
        if let Some(v) = env_bool("SLOTRUN_DEBUG") {
            self.debug = v;
        }
        if let Some(v) = env_parse("SLOTRUN_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v;
        }
        if let Some(v) = env_opt("SLOTRUN_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(v);
        }
        self
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(SlotrunError::InvalidConfig("max_workers must be at least 1".into()));
        }
        if self.max_workers_per_gpu == 0 {
            return Err(SlotrunError::InvalidConfig(
                "max_workers_per_gpu must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(SlotrunError::InvalidConfig("poll_interval_ms must be positive".into()));
        }
        if self.visible_devices_var.is_empty() {
            return Err(SlotrunError::InvalidConfig("visible_devices_var is empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            max_workers = self.max_workers,
            max_workers_per_gpu = self.max_workers_per_gpu,
            debug = self.debug,
            poll_interval_ms = self.poll_interval_ms,
            scratch_dir = %self.scratch_dir.display(),
            "scheduler config loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_workers, 16);
        assert_eq!(config.max_workers_per_gpu, 1);
        assert!(!config.debug);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.scratch_dir, PathBuf::from("tmp"));
        assert_eq!(config.visible_devices_var, "CUDA_VISIBLE_DEVICES");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_table_fills_defaults() {
        let config: SchedulerConfig = serde_json::from_str(r#"{"max_workers": 2}"#).unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.max_workers_per_gpu, 1);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config = SchedulerConfig { max_workers: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(SlotrunError::InvalidConfig(_))));

        let config = SchedulerConfig { max_workers_per_gpu: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(SlotrunError::InvalidConfig(_))));

        let config = SchedulerConfig { poll_interval_ms: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
