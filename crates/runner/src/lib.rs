//! Local GPU-aware batch runner.
//!
//! A [`Scheduler`] runs independent [`Job`](slotrun_core::Job)s on a bounded
//! worker pool, handing each job the exclusive GPU slots it asks for from a
//! shared [`ResourcePool`] and running it out-of-process through the
//! [`JobExecutor`].

pub mod discovery;
pub mod executor;
pub mod metrics;
pub mod pool;
pub mod scheduler;

pub use discovery::{parse_visible_devices, DeviceInventory};
pub use executor::JobExecutor;
pub use metrics::RunMetrics;
pub use pool::{PoolStats, ResourcePool, SlotLease};
pub use scheduler::{summarize, Scheduler};
