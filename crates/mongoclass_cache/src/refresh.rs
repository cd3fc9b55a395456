//! Periodic cache refresh.

use crate::error::{CacheError, CacheResult};
use crate::manager::CacheManager;
use mongoclass_core::{Model, Record};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Owns a background thread that rebuilds one collection's cache on a
/// fixed interval.
///
/// Dropping the handle stops the thread and waits for it. Call
/// [`RefreshHandle::detach`] to let it run for the life of the process.
pub struct RefreshHandle {
    name: String,
    signal: Arc<Signal>,
    runs: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    pub(crate) fn spawn<T: Record>(
        manager: CacheManager,
        model: Model<T>,
        every: Duration,
    ) -> CacheResult<Self> {
        let name = format!("refresh:{}", manager.list_key(&model));
        let signal = Arc::new(Signal::default());
        let runs = Arc::new(AtomicU64::new(0));

        let thread = {
            let signal = Arc::clone(&signal);
            let runs = Arc::clone(&runs);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || refresh_loop(&manager, &model, every, &signal, &runs))
                .map_err(|err| CacheError::Spawn {
                    message: err.to_string(),
                })?
        };
        tracing::debug!(task = %name, interval_ms = every.as_millis(), "started cache refresh");

        Ok(Self {
            name,
            signal,
            runs,
            thread: Some(thread),
        })
    }

    /// Refreshes completed successfully so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Whether the refresh thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the refresh and waits for an in-flight rebuild to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Lets the refresh outlive the handle.
    pub fn detach(mut self) {
        self.thread.take();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if thread.join().is_err() {
            tracing::warn!(task = %self.name, "cache refresh thread panicked");
        }
        tracing::debug!(task = %self.name, runs = self.runs(), "stopped cache refresh");
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshHandle")
            .field("name", &self.name)
            .field("runs", &self.runs())
            .field("running", &self.is_running())
            .finish()
    }
}

fn refresh_loop<T: Record>(
    manager: &CacheManager,
    model: &Model<T>,
    every: Duration,
    signal: &Signal,
    runs: &AtomicU64,
) {
    let mut stopped = signal.stopped.lock();
    loop {
        let deadline = Instant::now() + every;
        while !*stopped {
            if signal.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        if *stopped {
            return;
        }

        let result = MutexGuard::unlocked(&mut stopped, || manager.cache(model));
        match result {
            Ok(count) => {
                runs.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(namespace = %model.namespace(), count, "refreshed cache");
            }
            Err(err) => {
                tracing::warn!(namespace = %model.namespace(), error = %err, "cache refresh failed");
            }
        }
    }
}
