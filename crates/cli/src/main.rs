mod cli;
mod config;
mod terminal;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use slotrun_core::{load_dotenv, Job};
use slotrun_runner::{summarize, Scheduler};

use crate::cli::CliArgs;
use crate::config::{resolve_scheduler_config, BatchFile};
use crate::terminal::Terminal;

fn main() -> Result<ExitCode> {
    load_dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut batch = BatchFile::load(&args.batch)?;
    batch.select(&args.only)?;
    let config = resolve_scheduler_config(batch.scheduler.clone(), &args);
    config.log_summary();

    let scheduler = Scheduler::new(config).context("failed to start scheduler")?;

    let jobs: Vec<Arc<dyn Job>> = batch
        .jobs
        .into_iter()
        .map(|job| Arc::new(job) as Arc<dyn Job>)
        .collect();
    if jobs.is_empty() {
        warn!(batch = %args.batch.display(), "batch has no jobs");
    }

    let outcomes = scheduler.run_all(&jobs).context("batch run failed")?;
    let failed = summarize(&outcomes);

    let terminal = Terminal::new();
    if args.json {
        terminal.print_json(&outcomes)?;
    } else {
        terminal.print_summary(&outcomes, &scheduler.metrics())?;
    }

    if failed.is_empty() {
        info!("all jobs succeeded");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
