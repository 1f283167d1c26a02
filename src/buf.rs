//! Buffer slots and the handles that hold them.

use crate::cache::BlockCache;
use crate::sync::{SleepLock, SleepLockGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Identity of a disk block: device number plus block index on that device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
    pub device: u32,
    pub block: u32,
}

impl BlockId {
    pub const fn new(device: u32, block: u32) -> Self {
        Self { device, block }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.block)
    }
}

/// End-of-list marker for the intra-bucket links.
const NIL: usize = usize::MAX;

/// One cache slot.
///
/// `refcnt` and the links change only under the owning bucket's spinlock
/// (plus the pool lock for the 0 -> 1 claim). The payload and, apart from the
/// reset at claim time, `valid` belong to whoever holds `data`.
pub(crate) struct Buf {
    device: AtomicU32,
    block: AtomicU32,
    refcnt: AtomicU32,
    valid: AtomicBool,
    assigned: AtomicBool,
    prev: AtomicUsize,
    next: AtomicUsize,
    pub(crate) data: SleepLock<Box<[u8]>>,
}

impl Buf {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            device: AtomicU32::new(0),
            block: AtomicU32::new(0),
            refcnt: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            assigned: AtomicBool::new(false),
            prev: AtomicUsize::new(NIL),
            next: AtomicUsize::new(NIL),
            data: SleepLock::new("buffer", vec![0u8; block_size].into_boxed_slice()),
        }
    }

    pub(crate) fn id(&self) -> BlockId {
        BlockId::new(
            self.device.load(Ordering::Relaxed),
            self.block.load(Ordering::Relaxed),
        )
    }

    /// Give a freshly claimed slot its new identity. Returns the identity it
    /// held before, if any.
    pub(crate) fn assign(&self, id: BlockId) -> Option<BlockId> {
        let previous = self.assigned.swap(true, Ordering::Relaxed).then(|| self.id());
        self.device.store(id.device, Ordering::Relaxed);
        self.block.store(id.block, Ordering::Relaxed);
        self.valid.store(false, Ordering::Release);
        previous
    }

    pub(crate) fn ref_count(&self) -> u32 {
        self.refcnt.load(Ordering::Acquire)
    }

    pub(crate) fn take_ref(&self) {
        self.refcnt.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn drop_ref(&self) {
        self.refcnt.fetch_sub(1, Ordering::AcqRel);
    }

    /// 0 -> 1 transition. Only the pool scan calls this.
    pub(crate) fn try_claim(&self) -> bool {
        self.refcnt
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Last reference gone. The slot must already be unlinked.
    pub(crate) fn free(&self) {
        self.refcnt.store(0, Ordering::Release);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn set_valid(&self) {
        self.valid.store(true, Ordering::Release);
    }

    pub(crate) fn prev(&self) -> Option<usize> {
        link(self.prev.load(Ordering::Relaxed))
    }

    pub(crate) fn next(&self) -> Option<usize> {
        link(self.next.load(Ordering::Relaxed))
    }

    pub(crate) fn set_prev(&self, slot: Option<usize>) {
        self.prev.store(slot.unwrap_or(NIL), Ordering::Relaxed);
    }

    pub(crate) fn set_next(&self, slot: Option<usize>) {
        self.next.store(slot.unwrap_or(NIL), Ordering::Relaxed);
    }
}

fn link(raw: usize) -> Option<usize> {
    (raw != NIL).then_some(raw)
}

/// A referenced buffer whose exclusive lock is held.
///
/// Dereferences to the block payload. Dropping the guard releases it exactly
/// like [`BlockCache::release`]. The guard stays on the thread that acquired
/// the lock; other threads may borrow it, but `write` through such a borrow
/// is a lock-contract violation.
///
/// ```compile_fail
/// use bcache::{BlockCache, CacheConfig, MemDisk};
/// use std::sync::Arc;
///
/// let cache = BlockCache::new(CacheConfig::default(), Arc::new(MemDisk::new(1024))).unwrap();
/// let buf = cache.get(1, 5).unwrap();
/// std::thread::scope(|s| {
///     s.spawn(move || drop(buf));
/// });
/// ```
pub struct BufGuard<'c> {
    cache: &'c BlockCache,
    slot: usize,
    id: BlockId,
    data: Option<SleepLockGuard<'c, Box<[u8]>>>,
}

impl<'c> BufGuard<'c> {
    pub(crate) fn new(
        cache: &'c BlockCache,
        slot: usize,
        id: BlockId,
        data: SleepLockGuard<'c, Box<[u8]>>,
    ) -> Self {
        Self {
            cache,
            slot,
            id,
            data: Some(data),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Index of the backing slot in the pool.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Whether the payload reflects on-disk content.
    pub fn is_valid(&self) -> bool {
        self.cache.pool().buf(self.slot).is_valid()
    }

    pub fn ref_count(&self) -> u32 {
        self.cache.pool().buf(self.slot).ref_count()
    }

    pub fn is_held_by_caller(&self) -> bool {
        self.data
            .as_ref()
            .is_some_and(|data| data.is_held_by_caller())
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..],
            None => unreachable!("buffer {} used after release", self.id),
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.data {
            Some(data) => &mut data[..],
            None => unreachable!("buffer {} used after release", self.id),
        }
    }

    pub(crate) fn set_valid(&self) {
        self.cache.pool().buf(self.slot).set_valid();
    }

    pub(crate) fn belongs_to(&self, cache: &BlockCache) -> bool {
        std::ptr::eq(self.cache, cache)
    }

    /// Drop the exclusive lock, then the reference. Runs at most once.
    pub(crate) fn release_inner(&mut self) {
        if let Some(data) = self.data.take() {
            drop(data);
            self.cache.put_ref(self.slot, self.id);
        }
    }
}

impl Deref for BufGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl DerefMut for BufGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl Drop for BufGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for BufGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufGuard")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("held", &self.data.is_some())
            .finish()
    }
}

/// A pin reference: keeps a buffer resident and unrecyclable without holding
/// its exclusive lock. Dropping it is the same as [`BlockCache::unpin`].
pub struct PinnedBuf<'c> {
    cache: &'c BlockCache,
    slot: usize,
    id: BlockId,
    active: bool,
}

impl<'c> PinnedBuf<'c> {
    pub(crate) fn new(cache: &'c BlockCache, slot: usize, id: BlockId) -> Self {
        Self {
            cache,
            slot,
            id,
            active: true,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn unpin_inner(&mut self) {
        if std::mem::replace(&mut self.active, false) {
            self.cache.put_ref(self.slot, self.id);
        }
    }
}

impl Drop for PinnedBuf<'_> {
    fn drop(&mut self) {
        self.unpin_inner();
    }
}

impl fmt::Debug for PinnedBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedBuf")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId::new(1, 99).to_string(), "1:99");
    }

    #[test]
    fn test_fresh_slot() {
        let buf = Buf::new(512);
        assert_eq!(buf.ref_count(), 0);
        assert!(!buf.is_valid());
        assert_eq!(buf.prev(), None);
        assert_eq!(buf.next(), None);
        assert_eq!(buf.data.lock().len(), 512);
    }

    #[test]
    fn test_claim_only_when_free() {
        let buf = Buf::new(512);
        assert!(buf.try_claim());
        assert!(!buf.try_claim());
        buf.take_ref();
        assert_eq!(buf.ref_count(), 2);
        buf.drop_ref();
        buf.drop_ref();
        assert_eq!(buf.ref_count(), 0);
        assert!(buf.try_claim());
    }

    #[test]
    fn test_assign_resets_valid_and_reports_previous() {
        let buf = Buf::new(512);
        assert_eq!(buf.assign(BlockId::new(1, 5)), None);
        buf.set_valid();
        assert!(buf.is_valid());

        assert_eq!(buf.assign(BlockId::new(1, 99)), Some(BlockId::new(1, 5)));
        assert!(!buf.is_valid());
        assert_eq!(buf.id(), BlockId::new(1, 99));
    }
}
