//! Non-suspending mutual exclusion.

use std::fmt;

pub type SpinLockGuard<'a, T> = spin::MutexGuard<'a, T>;

/// Busy-waiting lock with a label, used for bucket and pool state.
pub struct SpinLock<T> {
    name: &'static str,
    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: spin::Mutex::new(value),
        }
    }

    /// Spin until the lock is ours.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.inner.lock()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}
