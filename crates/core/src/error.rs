use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlotrunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Job {job} requests {demand} GPU(s) but only {available} are available")]
    ResourceOveruse {
        job: String,
        demand: usize,
        available: usize,
    },

    #[error("Requested {demand} GPU(s) but the pool only has {available}")]
    ExceedsCapacity { demand: usize, available: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Job {0} cannot run in-process")]
    InProcessUnsupported(String),

    #[error("Job {job} failed in-process: {reason}")]
    InProcess { job: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for SlotrunError {
    fn from(e: serde_json::Error) -> Self {
        SlotrunError::Serialize(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SlotrunError>;
