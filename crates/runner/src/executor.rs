//! Out-of-process execution of a single job.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use slotrun_core::{Job, Outcome, ResourceId, SchedulerConfig, SlotrunError};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
enum LaunchError {
    #[error("failed to prepare job: {0}")]
    Setup(#[from] SlotrunError),

    #[error("failed to spawn command: {0}")]
    Spawn(io::Error),
}

impl From<io::Error> for LaunchError {
    fn from(e: io::Error) -> Self {
        LaunchError::Setup(SlotrunError::Io(e))
    }
}

/// Runs a job's command in a child shell with its output captured to the
/// job's log file and its GPU ids exported through the visibility variable.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    scratch_dir: PathBuf,
    visible_devices_var: String,
}

impl JobExecutor {
    pub fn new(scratch_dir: impl Into<PathBuf>, visible_devices_var: impl Into<String>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            visible_devices_var: visible_devices_var.into(),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(&config.scratch_dir, &config.visible_devices_var)
    }

    /// Temp config path for the job at `index`, unique per process and job.
    pub fn config_path(&self, index: usize) -> PathBuf {
        self.scratch_dir
            .join(format!("{}_{}_params.json", std::process::id(), index))
    }

    /// Temp config path used by sequential debug runs.
    pub fn debug_config_path(&self) -> PathBuf {
        self.scratch_dir
            .join(format!("{}_params.json", std::process::id()))
    }

    /// Run `job` on `gpu_ids` and report its outcome. Never panics on job
    /// failure; setup and spawn problems map to the sentinel exit codes.
    pub fn execute(&self, job: &dyn Job, gpu_ids: &[ResourceId], index: usize) -> Outcome {
        let exit_code = match self.launch(job, gpu_ids, index) {
            Ok(code) => code,
            Err(LaunchError::Spawn(e)) => {
                error!(job = job.name(), error = %e, "failed to spawn job");
                Outcome::SPAWN_FAILURE
            }
            Err(e) => {
                error!(job = job.name(), error = %e, "failed to launch job");
                Outcome::INTERNAL_FAILURE
            }
        };
        Outcome::new(job.name(), exit_code)
    }

    fn launch(&self, job: &dyn Job, gpu_ids: &[ResourceId], index: usize) -> Result<i32, LaunchError> {
        fs::create_dir_all(&self.scratch_dir)?;
        let config_path = self.config_path(index);
        let _cleanup = TempFile::new(config_path.clone());
        job.dump_config(&config_path)?;

        let cmd = job.command(&config_path, job.command_template());
        debug!(job = job.name(), command = %cmd, gpus = ?gpu_ids, "running command");

        let out_path = job.log_path("out");
        ensure_parent(&out_path)?;
        let stdout = File::create(&out_path)?;
        let stderr = stdout.try_clone()?;

        // CPU-only jobs get an empty list so they cannot see GPUs held by others.
        let status = shell(&cmd)
            .env(&self.visible_devices_var, join_ids(gpu_ids))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(LaunchError::Spawn)?;

        let code = exit_code(status);
        if code != 0 {
            warn!(job = job.name(), exit_code = code, "job failed, see {}", out_path.display());
        }
        Ok(code)
    }

    /// Run `job` in the foreground for debug mode: in-process when the job
    /// supports it, otherwise as a child sharing this terminal.
    pub fn run_attached(&self, job: &dyn Job) -> slotrun_core::Result<i32> {
        fs::create_dir_all(&self.scratch_dir)?;
        let config_path = self.debug_config_path();
        let _cleanup = TempFile::new(config_path.clone());
        job.dump_config(&config_path)?;

        if job.run_in_process() {
            debug!(job = job.name(), "running in-process");
            job.run()?;
            return Ok(0);
        }

        let cmd = job.command(&config_path, job.command_template());
        debug!(job = job.name(), command = %cmd, "running attached command");
        let status = shell(&cmd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(exit_code(status))
    }
}

/// Deletes the wrapped path when dropped. A missing file is not an error.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove temp config");
            }
        }
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn join_ids(ids: &[ResourceId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

#[cfg(unix)]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(windows)]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(Outcome::INTERNAL_FAILURE)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(Outcome::INTERNAL_FAILURE)
}
