//! Batch scheduler -- drives jobs through a bounded worker pool.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructors, and accessor methods
//! - `execution`: admission, pooled dispatch, and outcome summaries
//! - `debug`: sequential, pool-bypassing execution

mod core;
mod debug;
mod execution;

pub use self::core::Scheduler;
pub use self::execution::summarize;
