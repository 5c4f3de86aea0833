pub mod config;
pub mod error;
pub mod job;
pub mod shell_job;

pub use config::{load_dotenv, SchedulerConfig};
pub use error::*;
pub use job::*;
pub use shell_job::ShellJob;
