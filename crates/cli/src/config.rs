use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use slotrun_core::{SchedulerConfig, ShellJob};
use tracing::debug;

use crate::cli::CliArgs;

/// Batch file: optional `[scheduler]` table plus `[[jobs]]` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub jobs: Vec<ShellJob>,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading batch file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read batch file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to parse batch file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let batch: Self = toml::from_str(content)?;
        let mut seen = HashSet::new();
        for job in &batch.jobs {
            if !seen.insert(job.name.as_str()) {
                bail!("duplicate job name: {}", job.name);
            }
        }
        Ok(batch)
    }

    /// Keep only the named jobs. An empty filter keeps everything.
    pub fn select(&mut self, only: &[String]) -> Result<()> {
        if only.is_empty() {
            return Ok(());
        }
        for name in only {
            if !self.jobs.iter().any(|j| &j.name == name) {
                bail!("no job named {name} in batch");
            }
        }
        self.jobs.retain(|j| only.contains(&j.name));
        Ok(())
    }
}

/// Layer the scheduler config: batch file, then environment, then flags.
pub fn resolve_scheduler_config(file: SchedulerConfig, args: &CliArgs) -> SchedulerConfig {
    let mut config = file.apply_env();
    if let Some(v) = args.max_workers {
        config.max_workers = v;
    }
    if let Some(v) = args.max_workers_per_gpu {
        config.max_workers_per_gpu = v;
    }
    if args.debug {
        config.debug = true;
    }
    if let Some(v) = args.poll_interval_ms {
        config.poll_interval_ms = v;
    }
    if let Some(ref v) = args.scratch_dir {
        config.scratch_dir = v.clone();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const BATCH: &str = r#"
[scheduler]
max_workers = 4

[[jobs]]
name = "eval-qwen"
gpus = 1
command = "python run.py {config}"
log_dir = "outputs/logs"
[jobs.config]
model = "qwen-7b"

[[jobs]]
name = "summarize"
command = "python summarize.py {config}"
template = "nice -n 10 {task_cmd}"
"#;

    #[test]
    fn parses_batch_file() {
        let batch = BatchFile::parse(BATCH).unwrap();
        assert_eq!(batch.scheduler.max_workers, 4);
        assert_eq!(batch.scheduler.max_workers_per_gpu, 1);
        assert_eq!(batch.jobs.len(), 2);
        assert_eq!(batch.jobs[0].gpus, 1);
        assert_eq!(batch.jobs[0].config["model"], "qwen-7b");
        assert_eq!(batch.jobs[1].gpus, 0);
        assert_eq!(batch.jobs[0].template, "{task_cmd}");
        assert_eq!(batch.jobs[1].template, "nice -n 10 {task_cmd}");
    }

    #[test]
    fn missing_scheduler_table_uses_defaults() {
        let batch = BatchFile::parse("[[jobs]]\nname = \"a\"\ncommand = \"true\"\n").unwrap();
        assert_eq!(batch.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn rejects_duplicate_names() {
        let content = "[[jobs]]\nname = \"a\"\ncommand = \"true\"\n[[jobs]]\nname = \"a\"\ncommand = \"false\"\n";
        assert!(BatchFile::parse(content).is_err());
    }

    #[test]
    fn select_filters_jobs() {
        let mut batch = BatchFile::parse(BATCH).unwrap();
        batch.select(&["summarize".to_string()]).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.jobs[0].name, "summarize");

        assert!(batch.select(&["missing".to_string()]).is_err());
    }

    #[test]
    fn flags_override_file() {
        let args = CliArgs::parse_from(["slotrun", "batch.toml", "--max-workers", "2", "--debug"]);
        let config = resolve_scheduler_config(SchedulerConfig::default(), &args);
        assert_eq!(config.max_workers, 2);
        assert!(config.debug);
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.toml");
        std::fs::write(&path, BATCH).unwrap();
        assert_eq!(BatchFile::load(&path).unwrap().jobs.len(), 2);
        assert!(BatchFile::load(&dir.path().join("nope.toml")).is_err());
    }
}
