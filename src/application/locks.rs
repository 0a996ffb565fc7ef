use crate::error::{LedgerError, Result};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable<K> = Arc<DashMap<K, Arc<Mutex<()>>>>;

/// A table of async mutexes, one per key, created on first use.
///
/// This is the in-process stand-in for `SELECT ... FOR UPDATE`: whoever holds
/// the guard for a key is the only writer for that entity. An entry is removed
/// when its last guard is dropped and nobody is waiting on it.
pub struct KeyedLocks<K: Eq + Hash> {
    locks: LockTable<K>,
}

/// Exclusive hold on one key of a [`KeyedLocks`] table.
pub struct KeyedGuard<K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<Mutex<()>>,
    key: K,
    locks: LockTable<K>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        // Clone the Arc out so the shard guard is dropped before awaiting.
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.clone().lock_owned().await;
        KeyedGuard {
            guard: Some(guard),
            mutex,
            key,
            locks: self.locks.clone(),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        // One reference in the table and one here means nobody else holds or awaits it.
        self.locks
            .remove_if(&self.key, |_, mutex| {
                Arc::ptr_eq(mutex, &self.mutex) && Arc::strong_count(mutex) == 2
            });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    TaxSweep,
    AuctionClose,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaxSweep => "tax-sweep",
            Self::AuctionClose => "auction-close",
        }
    }
}

/// Guarantees a batch job never overlaps with another run of itself.
#[derive(Default)]
pub struct JobLocks {
    running: KeyedLocks<Job>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `job` without waiting; fails if another run holds it.
    pub fn try_acquire(&self, job: Job) -> Result<OwnedMutexGuard<()>> {
        let mutex = self.running.locks.entry(job).or_default().clone();
        mutex
            .try_lock_owned()
            .map_err(|_| LedgerError::JobAlreadyRunning(job.name()))
    }
}
