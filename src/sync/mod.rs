//! Lock primitives for the cache.
//!
//! Two classes that must never be substituted for one another:
//! - [`SpinLock`]: busy-waits, for short bucket and pool critical sections.
//!   A holder must not block, sleep, or take a [`SleepLock`].
//! - [`SleepLock`]: parks waiters, remembers which thread holds it, and is the
//!   only lock that may be held across disk I/O.

pub mod sleeplock;
pub mod spinlock;

pub use sleeplock::{SleepLock, SleepLockGuard};
pub use spinlock::{SpinLock, SpinLockGuard};
