//! Named distributed mutex.

use crate::error::{LockError, LockResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A cooperative named mutex shared by every cache writer.
///
/// `lock` blocks until the name is free. There is no timeout.
pub trait DistributedLock: Send + Sync {
    /// Acquires `name`, blocking while another holder has it.
    fn lock(&self, name: &str) -> LockResult<()>;

    /// Releases `name`.
    fn unlock(&self, name: &str) -> LockResult<()>;
}

/// Holds a lock until dropped.
///
/// Release failures are logged, not raised, so the guard can be dropped
/// during error propagation.
#[must_use = "the lock is released when the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a dyn DistributedLock,
    name: String,
}

impl<'a> LockGuard<'a> {
    /// Acquires `name` on `lock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock service fails.
    pub fn acquire(lock: &'a dyn DistributedLock, name: impl Into<String>) -> LockResult<Self> {
        let name = name.into();
        lock.lock(&name)?;
        tracing::trace!(lock = %name, "lock acquired");
        Ok(Self { lock, name })
    }

    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self.lock.unlock(&self.name) {
            Ok(()) => tracing::trace!(lock = %self.name, "lock released"),
            Err(err) => tracing::warn!(lock = %self.name, error = %err, "failed to release lock"),
        }
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("name", &self.name).finish()
    }
}

/// Process-local [`DistributedLock`].
///
/// Clones share the same lock table.
#[derive(Clone, Default)]
pub struct InMemoryLock {
    inner: Arc<LockTable>,
}

#[derive(Default)]
struct LockTable {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl InMemoryLock {
    /// Creates a lock table with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.inner.held.lock().contains(name)
    }
}

impl fmt::Debug for InMemoryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held = self.inner.held.lock();
        f.debug_struct("InMemoryLock").field("held", &*held).finish()
    }
}

impl DistributedLock for InMemoryLock {
    fn lock(&self, name: &str) -> LockResult<()> {
        let mut held = self.inner.held.lock();
        while held.contains(name) {
            self.inner.released.wait(&mut held);
        }
        held.insert(name.to_string());
        Ok(())
    }

    fn unlock(&self, name: &str) -> LockResult<()> {
        let mut held = self.inner.held.lock();
        if !held.remove(name) {
            return Err(LockError::NotHeld {
                name: name.to_string(),
            });
        }
        drop(held);
        self.inner.released.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let lock = InMemoryLock::new();
        {
            let guard = LockGuard::acquire(&lock, "lock:main:position").unwrap();
            assert_eq!(guard.name(), "lock:main:position");
            assert!(lock.is_held("lock:main:position"));
        }
        assert!(!lock.is_held("lock:main:position"));
    }

    #[test]
    fn unlock_not_held() {
        let lock = InMemoryLock::new();
        assert_eq!(
            lock.unlock("x"),
            Err(LockError::NotHeld { name: "x".into() })
        );
    }

    #[test]
    fn names_are_independent() {
        let lock = InMemoryLock::new();
        let _a = LockGuard::acquire(&lock, "a").unwrap();
        let _b = LockGuard::acquire(&lock, "b").unwrap();
        assert!(lock.is_held("a") && lock.is_held("b"));
    }

    #[test]
    fn excludes_concurrent_holders() {
        let lock = InMemoryLock::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let _guard = LockGuard::acquire(&lock, "shared").unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(!lock.is_held("shared"));
    }
}
