//! Exclusive GPU slot accounting.
//!
//! The slot table is the only state shared between workers. Every read and
//! write happens under one mutex held just long enough to scan the table.
//! Waiters poll with a fixed back-off instead of queueing, so acquisition is
//! not FIFO: a later job with a small demand can overtake an earlier job that
//! needs more GPUs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use slotrun_core::{ResourceId, Result, SlotrunError};
use tracing::{trace, warn};

use crate::discovery::DeviceInventory;

/// Free capacity per GPU id plus the capacity fixed at construction.
///
/// Only listed ids are stored, so the table grows with the number of devices
/// rather than with the largest id.
#[derive(Debug)]
pub struct ResourcePool {
    /// Listed ids in ascending order; `capacity` and the slot table share its indices.
    ids: Vec<ResourceId>,
    capacity: Vec<usize>,
    slots: Mutex<Vec<usize>>,
    poll_interval: Duration,
    acquires: AtomicUsize,
    releases: AtomicUsize,
}

/// Lease counters, for checking that every acquire was paired with a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub acquires: usize,
    pub releases: usize,
}

impl PoolStats {
    pub fn outstanding(&self) -> usize {
        self.acquires.saturating_sub(self.releases)
    }
}

impl ResourcePool {
    /// Build a pool where `capacity[id]` is the number of concurrent holders
    /// allowed on `id`. Indices with capacity 0 are not usable.
    pub fn new(capacity: Vec<usize>, poll_interval: Duration) -> Self {
        Self::with_capacities(capacity.into_iter().enumerate(), poll_interval)
    }

    /// Build a pool from `(id, capacity)` pairs. Ids with capacity 0 are
    /// dropped; a repeated id keeps its last capacity.
    pub fn with_capacities(
        entries: impl IntoIterator<Item = (ResourceId, usize)>,
        poll_interval: Duration,
    ) -> Self {
        let table: BTreeMap<ResourceId, usize> = entries
            .into_iter()
            .filter(|&(_, cap)| cap > 0)
            .collect();
        let (ids, capacity): (Vec<ResourceId>, Vec<usize>) = table.into_iter().unzip();
        Self {
            slots: Mutex::new(capacity.clone()),
            ids,
            capacity,
            poll_interval,
            acquires: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Seed every discovered id with `per_id` capacity.
    pub fn from_inventory(inventory: &DeviceInventory, per_id: usize, poll_interval: Duration) -> Self {
        Self::with_capacities(inventory.ids().iter().map(|&id| (id, per_id)), poll_interval)
    }

    /// A CPU-only pool.
    pub fn empty(poll_interval: Duration) -> Self {
        Self::new(Vec::new(), poll_interval)
    }

    /// Usable ids in ascending order.
    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    /// Number of ids that can hold a lease.
    pub fn device_count(&self) -> usize {
        self.ids.len()
    }

    pub fn total_capacity(&self) -> usize {
        self.capacity.iter().sum()
    }

    pub fn capacity_of(&self, id: ResourceId) -> usize {
        self.index_of(id).map_or(0, |i| self.capacity[i])
    }

    /// Current free capacity of each usable id, in the order of [`ResourcePool::ids`].
    pub fn snapshot(&self) -> Vec<usize> {
        self.lock().clone()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquires: self.acquires.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
        }
    }

    /// Fail when `count` distinct ids could never be free at the same time.
    pub fn check_demand(&self, count: usize) -> Result<()> {
        let available = self.device_count();
        if count > available {
            return Err(SlotrunError::ExceedsCapacity { demand: count, available });
        }
        Ok(())
    }

    /// Block until `count` distinct ids are free and claim them.
    ///
    /// `count == 0` returns an empty lease immediately. A demand the pool can
    /// never satisfy is rejected before polling starts.
    pub fn acquire(&self, count: usize) -> Result<SlotLease<'_>> {
        if count == 0 {
            return Ok(SlotLease { pool: self, ids: Vec::new() });
        }
        self.check_demand(count)?;

        loop {
            if let Some(lease) = self.try_acquire(count) {
                return Ok(lease);
            }
            trace!(count, "no free slots, backing off");
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Claim the first `count` free ids in ascending order, if there are that many.
    pub fn try_acquire(&self, count: usize) -> Option<SlotLease<'_>> {
        if count == 0 {
            return Some(SlotLease { pool: self, ids: Vec::new() });
        }
        let mut slots = self.lock();
        let picked: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, &free)| free > 0)
            .map(|(i, _)| i)
            .take(count)
            .collect();
        if picked.len() < count {
            return None;
        }
        for &i in &picked {
            slots[i] -= 1;
        }
        drop(slots);

        self.acquires.fetch_add(1, Ordering::SeqCst);
        let ids = picked.into_iter().map(|i| self.ids[i]).collect();
        Some(SlotLease { pool: self, ids })
    }

    /// Return one unit of capacity to each id in `ids`.
    ///
    /// Prefer dropping the [`SlotLease`]; this is for ids obtained through
    /// [`SlotLease::into_ids`].
    pub fn release(&self, ids: &[ResourceId]) {
        if ids.is_empty() {
            return;
        }
        let mut slots = self.lock();
        for &id in ids {
            match self.index_of(id) {
                Some(i) if slots[i] < self.capacity[i] => slots[i] += 1,
                _ => warn!(gpu = id, "released a slot that was not held"),
            }
        }
        drop(slots);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn index_of(&self, id: ResourceId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    // The table is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<usize>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// GPU ids held by one job. Dropping the lease releases them.
#[derive(Debug)]
pub struct SlotLease<'a> {
    pool: &'a ResourcePool,
    ids: Vec<ResourceId>,
}

impl SlotLease<'_> {
    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Detach the ids; the caller must hand them back with [`ResourcePool::release`].
    pub fn into_ids(mut self) -> Vec<ResourceId> {
        std::mem::take(&mut self.ids)
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        self.pool.release(&self.ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn pool(capacity: Vec<usize>) -> ResourcePool {
        ResourcePool::new(capacity, Duration::from_millis(1))
    }

    #[test]
    fn acquire_zero_is_immediate_and_empty() {
        let pool = pool(vec![]);
        let lease = pool.acquire(0).unwrap();
        assert!(lease.is_empty());
        drop(lease);
        assert_eq!(pool.stats(), PoolStats { acquires: 0, releases: 0 });
    }

    #[test]
    fn acquire_takes_lowest_free_ids() {
        let pool = pool(vec![1, 1, 1]);
        let lease = pool.acquire(2).unwrap();
        assert_eq!(lease.ids(), &[0, 1]);
        assert_eq!(pool.snapshot(), vec![0, 0, 1]);
        drop(lease);
        assert_eq!(pool.snapshot(), vec![1, 1, 1]);
    }

    #[test]
    fn try_acquire_fails_without_enough_free_ids() {
        let pool = pool(vec![1, 1]);
        let held = pool.try_acquire(1).unwrap();
        assert_eq!(held.ids(), &[0]);
        assert!(pool.try_acquire(2).is_none());
        assert_eq!(pool.snapshot(), vec![0, 1]);
    }

    #[test]
    fn demand_over_capacity_is_rejected_before_polling() {
        let pool = pool(vec![1, 1]);
        let err = pool.acquire(3).unwrap_err();
        assert!(matches!(err, SlotrunError::ExceedsCapacity { demand: 3, available: 2 }));

        let cpu_only = ResourcePool::empty(Duration::from_secs(3600));
        assert!(cpu_only.acquire(1).is_err());
    }

    #[test]
    fn demand_counts_distinct_ids_not_total_capacity() {
        // Two workers per GPU on a single GPU still cannot satisfy a 2-GPU job.
        let pool = pool(vec![2]);
        assert_eq!(pool.total_capacity(), 2);
        assert!(pool.check_demand(2).is_err());
    }

    #[test]
    fn from_inventory_keeps_only_listed_ids() {
        let inventory = DeviceInventory::new([1, 3]);
        let pool = ResourcePool::from_inventory(&inventory, 2, Duration::from_millis(1));
        assert_eq!(pool.ids(), &[1, 3]);
        assert_eq!(pool.snapshot(), vec![2, 2]);
        assert_eq!(pool.device_count(), 2);
        assert_eq!(pool.capacity_of(1), 2);
        assert_eq!(pool.capacity_of(0), 0);
        assert_eq!(pool.capacity_of(9), 0);

        let lease = pool.acquire(2).unwrap();
        assert_eq!(lease.ids(), &[1, 3]);
    }

    #[test]
    fn huge_ids_do_not_size_the_table() {
        let inventory = DeviceInventory::new([usize::MAX, 4_000_000_000]);
        let pool = ResourcePool::from_inventory(&inventory, 1, Duration::from_millis(1));
        assert_eq!(pool.device_count(), 2);
        assert_eq!(pool.snapshot(), vec![1, 1]);

        let lease = pool.acquire(1).unwrap();
        assert_eq!(lease.ids(), &[4_000_000_000]);
        drop(lease);

        let lease = pool.acquire(2).unwrap();
        assert_eq!(lease.ids(), &[4_000_000_000, usize::MAX]);
        drop(lease);
        assert_eq!(pool.snapshot(), vec![1, 1]);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn zero_capacity_entries_are_not_usable() {
        let pool = pool(vec![0, 1, 0, 1]);
        assert_eq!(pool.ids(), &[1, 3]);
        assert_eq!(pool.total_capacity(), 2);
        assert!(pool.check_demand(3).is_err());
    }

    #[test]
    fn released_ids_can_be_reacquired_after_into_ids() {
        let pool = pool(vec![1]);
        let ids = pool.acquire(1).unwrap().into_ids();
        assert_eq!(pool.snapshot(), vec![0]);
        pool.release(&ids);
        assert_eq!(pool.snapshot(), vec![1]);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn extra_release_never_exceeds_capacity() {
        let pool = pool(vec![1]);
        pool.release(&[0]);
        pool.release(&[5]);
        assert_eq!(pool.snapshot(), vec![1]);
    }

    #[test]
    fn concurrent_holders_never_exceed_capacity() {
        let pool = Arc::new(pool(vec![1, 1, 1]));
        let holders: Arc<Vec<AtomicUsize>> = Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                let holders = Arc::clone(&holders);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let lease = pool.acquire(1 + i % 2).unwrap();
                        for &id in lease.ids() {
                            let now = holders[id].fetch_add(1, Ordering::SeqCst) + 1;
                            assert!(now <= 1, "gpu {id} held by {now} jobs");
                        }
                        thread::sleep(Duration::from_micros(200));
                        for &id in lease.ids() {
                            holders[id].fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.snapshot(), vec![1, 1, 1]);
        let stats = pool.stats();
        assert_eq!(stats.acquires, 160);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn lease_is_released_on_panic() {
        let pool = Arc::new(pool(vec![1]));
        let cloned = Arc::clone(&pool);
        let result = thread::spawn(move || {
            let _lease = cloned.acquire(1).unwrap();
            panic!("job blew up");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(pool.snapshot(), vec![1]);
    }
}
