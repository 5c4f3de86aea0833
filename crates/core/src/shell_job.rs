//! Jobs described declaratively in a batch file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::job::{render_template, Job, TASK_CMD_PLACEHOLDER};

/// Placeholder for the temp config path inside [`ShellJob::command`].
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// A shell command job with a JSON-dumped config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellJob {
    pub name: String,
    /// GPUs required (0 for CPU-only).
    #[serde(default)]
    pub gpus: usize,
    /// Shell command; `{config}` is replaced by the temp config path.
    pub command: String,
    /// Wrapper the command is placed into at `{task_cmd}`.
    #[serde(default = "default_template")]
    pub template: String,
    /// Arbitrary config passed to the command through the temp file.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Directory receiving `<name>.<ext>` output files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_template() -> String {
    TASK_CMD_PLACEHOLDER.to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("outputs/logs")
}

impl ShellJob {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gpus: 0,
            command: command.into(),
            template: default_template(),
            config: serde_json::Value::Null,
            log_dir: default_log_dir(),
        }
    }

    pub fn with_gpus(mut self, gpus: usize) -> Self {
        self.gpus = gpus;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }
}

impl Job for ShellJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_demand(&self) -> usize {
        self.gpus
    }

    fn dump_config(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(&self.config)?;
        std::fs::write(path, body)?;
        Ok(())
    }

    fn command_template(&self) -> &str {
        &self.template
    }

    fn command(&self, config_path: &Path, template: &str) -> String {
        let task_cmd = self
            .command
            .replace(CONFIG_PLACEHOLDER, &config_path.display().to_string());
        render_template(template, &task_cmd)
    }

    fn log_path(&self, extension: &str) -> PathBuf {
        self.log_dir.join(format!("{}.{}", self.name, extension))
    }
}
