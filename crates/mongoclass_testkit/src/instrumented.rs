//! Instrumented lock for concurrency tests.
//!
//! Wraps [`InMemoryLock`] and records how many callers held a given name
//! at the same time. A correct lock never lets that exceed one.

use mongoclass_cache::{DistributedLock, InMemoryLock, LockResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    holders: Mutex<HashMap<String, usize>>,
    max_holders: AtomicUsize,
    acquisitions: AtomicUsize,
}

/// An [`InMemoryLock`] that counts holders per name.
#[derive(Debug, Clone, Default)]
pub struct InstrumentedLock {
    lock: InMemoryLock,
    counters: Arc<Counters>,
}

impl InstrumentedLock {
    /// Creates an instrumented lock over a fresh [`InMemoryLock`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of simultaneous holders of any one name.
    pub fn max_holders(&self) -> usize {
        self.counters.max_holders.load(Ordering::SeqCst)
    }

    /// Number of successful `lock` calls.
    pub fn acquisitions(&self) -> usize {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    /// Whether `name` is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.lock.is_held(name)
    }
}

impl DistributedLock for InstrumentedLock {
    fn lock(&self, name: &str) -> LockResult<()> {
        self.lock.lock(name)?;
        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        let mut holders = self.counters.holders.lock();
        let count = holders.entry(name.to_string()).or_default();
        *count += 1;
        self.counters.max_holders.fetch_max(*count, Ordering::SeqCst);
        Ok(())
    }

    fn unlock(&self, name: &str) -> LockResult<()> {
        {
            let mut holders = self.counters.holders.lock();
            if let Some(count) = holders.get_mut(name) {
                *count = count.saturating_sub(1);
            }
        }
        self.lock.unlock(name)
    }
}
