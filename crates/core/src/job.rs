use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotrunError};

/// Identifier of one exclusive slot provider (one GPU).
pub type ResourceId = usize;

/// Substitution point for the resolved job command inside a template.
pub const TASK_CMD_PLACEHOLDER: &str = "{task_cmd}";

/// A unit of work the scheduler can run.
///
/// Jobs are produced upstream and never mutated by the scheduler.
pub trait Job: Send + Sync {
    /// Name used for logging and as the outcome key.
    fn name(&self) -> &str;

    /// Number of exclusive GPU slots required. 0 means CPU-only.
    fn resource_demand(&self) -> usize;

    /// Write the job's config to `path`.
    fn dump_config(&self, path: &Path) -> Result<()>;

    /// Template the resolved command is placed into. Must contain
    /// [`TASK_CMD_PLACEHOLDER`] once, e.g. `nice -n 5 {task_cmd}`.
    fn command_template(&self) -> &str {
        TASK_CMD_PLACEHOLDER
    }

    /// Resolve the shell command for a dumped config at `config_path`,
    /// placed into `template` at [`TASK_CMD_PLACEHOLDER`].
    fn command(&self, config_path: &Path, template: &str) -> String;

    /// Where captured output for this job goes.
    fn log_path(&self, extension: &str) -> PathBuf;

    /// Whether debug mode should call [`Job::run`] instead of spawning.
    fn run_in_process(&self) -> bool {
        false
    }

    /// Execute the job's logic in the current process.
    fn run(&self) -> Result<()> {
        Err(SlotrunError::InProcessUnsupported(self.name().to_string()))
    }
}

/// Terminal `(name, exit code)` result of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub exit_code: i32,
}

impl Outcome {
    /// The scheduler failed before or around the child (config dump, log
    /// file, worker panic).
    pub const INTERNAL_FAILURE: i32 = -1;
    /// The child process could not be started. Jobs run through `sh -c`, so
    /// this only covers the shell itself failing to start; an unknown command
    /// inside the shell reports the shell's own 127.
    pub const SPAWN_FAILURE: i32 = -2;

    pub fn new(name: impl Into<String>, exit_code: i32) -> Self {
        Self { name: name.into(), exit_code }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.exit_code)
    }
}

/// Substitute `task_cmd` into `template`.
pub fn render_template(template: &str, task_cmd: &str) -> String {
    template.replace(TASK_CMD_PLACEHOLDER, task_cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_success() {
        assert!(Outcome::new("a", 0).is_success());
        assert!(!Outcome::new("a", 7).is_success());
        assert!(!Outcome::new("a", Outcome::SPAWN_FAILURE).is_success());
        assert_eq!(Outcome::new("eval", 3).to_string(), "eval (3)");
    }

    #[test]
    fn template_substitution() {
        assert_eq!(render_template("{task_cmd}", "echo hi"), "echo hi");
        assert_eq!(render_template("nice -n 5 {task_cmd}", "echo hi"), "nice -n 5 echo hi");
    }
}
