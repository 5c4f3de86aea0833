use std::sync::atomic::AtomicUsize;
use std::sync::{PoisonError, RwLock};

use slotrun_core::{Result, SchedulerConfig};
use tracing::info;

use crate::discovery::DeviceInventory;
use crate::executor::JobExecutor;
use crate::metrics::RunMetrics;
use crate::pool::ResourcePool;

/// The batch scheduler. Owns the slot pool, the executor and the worker
/// pool settings for one machine.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    /// GPU slot table shared by all workers.
    pub(super) pool: ResourcePool,
    pub(super) executor: JobExecutor,
    /// Metrics for the most recent batch.
    pub(super) metrics: RwLock<RunMetrics>,
    /// Jobs currently holding a worker past acquisition.
    pub(super) active_jobs: AtomicUsize,
    pub(super) peak_active: AtomicUsize,
}

impl Scheduler {
    /// Validate `config` and discover the host's GPUs.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let inventory = DeviceInventory::discover(&config.visible_devices_var);
        let pool = ResourcePool::from_inventory(
            &inventory,
            config.max_workers_per_gpu,
            config.poll_interval(),
        );
        Self::with_pool(config, pool)
    }

    /// Build a scheduler around an explicit slot pool.
    pub fn with_pool(config: SchedulerConfig, pool: ResourcePool) -> Result<Self> {
        config.validate()?;
        info!(
            max_workers = config.max_workers,
            gpus = pool.device_count(),
            gpu_slots = pool.total_capacity(),
            debug = config.debug,
            "scheduler ready"
        );
        Ok(Self {
            executor: JobExecutor::from_config(&config),
            config,
            pool,
            metrics: RwLock::new(RunMetrics::default()),
            active_jobs: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Snapshot of the metrics for the current or last batch.
    pub fn metrics(&self) -> RunMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
