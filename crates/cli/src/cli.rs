use std::path::PathBuf;

use clap::Parser;

/// Run a batch of GPU jobs on this machine.
///
/// Jobs are read from a TOML batch file and run on a bounded worker pool,
/// each holding the GPUs it asked for exclusively while it runs.
#[derive(Parser, Debug)]
#[command(name = "slotrun", version, about = "Run a batch of GPU jobs on this machine")]
pub struct CliArgs {
    /// Path to the batch file
    #[arg(env = "SLOTRUN_BATCH")]
    pub batch: PathBuf,

    /// Maximum number of jobs running at once
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Concurrent jobs allowed on each GPU
    #[arg(long)]
    pub max_workers_per_gpu: Option<usize>,

    /// Run jobs one at a time with output on this terminal
    #[arg(long)]
    pub debug: bool,

    /// Back-off between GPU acquisition attempts, in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Directory for temporary job config files
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Only run jobs with these names (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,

    /// Print outcomes as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
