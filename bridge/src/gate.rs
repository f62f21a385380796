//! The blocking-call concurrency gate.
//!
//! The host runs a single thread of control under a process-wide lock (the
//! moral equivalent of an interpreter lock). Long-running engine calls must
//! not hold that lock for their whole duration, so the four long operations
//! run inside `HostGuard::allow_threads`, which releases the lock for the
//! call and reacquires it before returning. The gate does not serialize
//! concurrent callers on the same net or solver; that remains the caller's
//! job.

use parking_lot::{Mutex, MutexGuard};

/// The host's single-threaded execution lock.
pub struct HostLock {
    inner: Mutex<()>,
}

static HOST_LOCK: HostLock = HostLock::new();

/// The process-wide host lock instance.
pub fn host_lock() -> &'static HostLock {
    &HOST_LOCK
}

impl HostLock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// Blocks until the lock is held.
    pub fn acquire(&self) -> HostGuard<'_> {
        HostGuard {
            lock: self,
            held: Some(self.inner.lock()),
        }
    }

    pub fn try_acquire(&self) -> Option<HostGuard<'_>> {
        self.inner.try_lock().map(|held| HostGuard {
            lock: self,
            held: Some(held),
        })
    }
}

impl Default for HostLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding the host lock. Long-running boundary operations take
/// `&mut HostGuard` so they can release it for the engine call's duration.
pub struct HostGuard<'a> {
    lock: &'a HostLock,
    held: Option<MutexGuard<'a, ()>>,
}

impl HostGuard<'_> {
    /// Runs `f` with the host lock released, reacquiring it before
    /// returning. There is no way to interrupt `f` once started.
    pub fn allow_threads<R>(&mut self, f: impl FnOnce() -> R) -> R {
        drop(self.held.take());
        let result = f();
        self.held = Some(self.lock.inner.lock());
        result
    }
}
