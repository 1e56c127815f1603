use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Hands out CPU ids to concurrently running jobs. Each id is held by a
/// [`CpuLease`] and returned to the pool when the lease is dropped.
#[derive(Debug, Clone)]
pub struct CpuAffinityPool {
    cpus: usize,
    assigned: Arc<Mutex<BTreeSet<usize>>>,
}

impl CpuAffinityPool {
    pub fn new(cpus: usize) -> Self {
        Self {
            cpus,
            assigned: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// A pool covering every CPU on this host.
    pub fn for_host() -> Self {
        Self::new(crate::available_cpus())
    }

    pub fn capacity(&self) -> usize {
        self.cpus
    }

    pub fn in_use(&self) -> usize {
        self.assigned.lock().len()
    }

    /// Claims the lowest free CPU id, or `None` when every CPU is taken.
    pub fn acquire(&self) -> Option<CpuLease> {
        let mut assigned = self.assigned.lock();
        let cpu = (0..self.cpus).find(|cpu| !assigned.contains(cpu))?;
        assigned.insert(cpu);
        debug!(cpu, "acquired cpu");
        Some(CpuLease {
            cpu,
            pool: Arc::clone(&self.assigned),
        })
    }
}

#[derive(Debug)]
pub struct CpuLease {
    cpu: usize,
    pool: Arc<Mutex<BTreeSet<usize>>>,
}

impl CpuLease {
    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

impl Drop for CpuLease {
    fn drop(&mut self) {
        self.pool.lock().remove(&self.cpu);
        debug!(cpu = self.cpu, "released cpu");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leases_are_unique_and_released_on_drop() {
        let pool = CpuAffinityPool::new(2);
        let first = pool.acquire().expect("cpu 0");
        let second = pool.acquire().expect("cpu 1");
        assert_eq!((first.cpu(), second.cpu()), (0, 1));
        assert!(pool.acquire().is_none());
        assert_eq!(pool.in_use(), 2);

        drop(first);
        let again = pool.acquire().expect("cpu 0 again");
        assert_eq!(again.cpu(), 0);
        drop(again);
        drop(second);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn clones_share_assignments() {
        let pool = CpuAffinityPool::new(1);
        let clone = pool.clone();
        let _lease = pool.acquire().expect("cpu");
        assert!(clone.acquire().is_none());
    }
}
