//! Suspend-capable mutual exclusion with owner tracking.
//!
//! Waiters park on a `parking_lot` mutex instead of spinning. The owning
//! thread is recorded under a [`SpinLock`] so that callers can check
//! whether *they* hold the lock, not merely whether someone does.

use super::SpinLock;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

pub struct SleepLock<T> {
    name: &'static str,
    owner: SpinLock<Option<ThreadId>>,
    inner: Mutex<T>,
}

impl<T> SleepLock<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            owner: SpinLock::new("sleeplock.owner", None),
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, parking the calling thread while another holds it.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let guard = self.inner.lock();
        *self.owner.lock() = Some(thread::current().id());
        SleepLockGuard { lock: self, guard }
    }

    /// True only when the calling thread is the one that acquired the lock.
    pub fn is_held_by_caller(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.name)
            .field("owner", &*self.owner.lock())
            .finish()
    }
}

/// Holds a [`SleepLock`]. Not `Send`: it is dropped on the thread that
/// acquired the lock, which stays the recorded owner until then.
pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> SleepLockGuard<'_, T> {
    pub fn is_held_by_caller(&self) -> bool {
        self.lock.is_held_by_caller()
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        // Owner is cleared before the inner mutex unlocks with `guard`.
        *self.lock.owner.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_owner_tracking() {
        let lock = SleepLock::new("buffer", 0u32);
        assert!(!lock.is_held_by_caller());

        let guard = lock.lock();
        assert!(guard.is_held_by_caller());
        assert!(lock.is_locked());

        thread::scope(|s| {
            s.spawn(|| assert!(!lock.is_held_by_caller()));
        });

        drop(guard);
        assert!(!lock.is_held_by_caller());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_borrowed_guard_reports_real_owner() {
        let lock = SleepLock::new("buffer", 7u32);
        let guard = lock.lock();

        thread::scope(|s| {
            s.spawn(|| {
                assert!(!guard.is_held_by_caller());
                assert_eq!(*guard, 7);
            });
        });

        assert!(guard.is_held_by_caller());
        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_waiter_blocks_until_release() {
        let lock = SleepLock::new("buffer", Vec::new());
        let acquired = AtomicBool::new(false);

        let mut guard = lock.lock();
        thread::scope(|s| {
            s.spawn(|| {
                let mut g = lock.lock();
                acquired.store(true, Ordering::SeqCst);
                g.push(2);
            });

            thread::sleep(Duration::from_millis(50));
            assert!(!acquired.load(Ordering::SeqCst));
            guard.push(1);
            drop(guard);
        });

        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(*lock.lock(), vec![1, 2]);
    }
}
