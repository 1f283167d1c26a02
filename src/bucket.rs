//! Hash shards of the lookup structure.
//!
//! Each bucket owns an unordered doubly linked list of the pool slots whose
//! block index hashes to it. Links are pool indices stored on the slots, so
//! attach and detach are O(1) and nothing dangles when a slot is recycled.

use crate::buf::{BlockId, Buf};
use crate::sync::{SpinLock, SpinLockGuard};

pub(crate) struct Bucket {
    list: SpinLock<BucketList>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self {
            list: SpinLock::new("bcache.bucket", BucketList { head: None }),
        }
    }

    #[inline]
    pub(crate) fn lock(&self) -> SpinLockGuard<'_, BucketList> {
        self.list.lock()
    }
}

/// List state, reachable only through the bucket's spinlock.
pub(crate) struct BucketList {
    head: Option<usize>,
}

impl BucketList {
    pub(crate) fn find(&self, bufs: &[Buf], id: BlockId) -> Option<usize> {
        self.iter(bufs).find(|&slot| bufs[slot].id() == id)
    }

    /// Link `slot` in as the new head.
    pub(crate) fn push_front(&mut self, bufs: &[Buf], slot: usize) {
        let buf = &bufs[slot];
        buf.set_prev(None);
        buf.set_next(self.head);
        if let Some(head) = self.head {
            bufs[head].set_prev(Some(slot));
        }
        self.head = Some(slot);
    }

    /// Unlink `slot`, which must be on this list.
    pub(crate) fn remove(&mut self, bufs: &[Buf], slot: usize) {
        let buf = &bufs[slot];
        let (prev, next) = (buf.prev(), buf.next());
        if let Some(prev) = prev {
            bufs[prev].set_next(next);
        }
        if let Some(next) = next {
            bufs[next].set_prev(prev);
        }
        if self.head == Some(slot) {
            self.head = next;
        }
        buf.set_prev(None);
        buf.set_next(None);
    }

    pub(crate) fn iter<'a>(&self, bufs: &'a [Buf]) -> impl Iterator<Item = usize> + 'a {
        std::iter::successors(self.head, move |&slot| bufs[slot].next())
    }

    pub(crate) fn len(&self, bufs: &[Buf]) -> usize {
        self.iter(bufs).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(n: usize) -> Vec<Buf> {
        (0..n)
            .map(|i| {
                let buf = Buf::new(512);
                buf.assign(BlockId::new(1, i as u32 * 13));
                buf
            })
            .collect()
    }

    #[test]
    fn test_push_front_orders_newest_first() {
        let bufs = slots(3);
        let bucket = Bucket::new();
        let mut list = bucket.lock();

        list.push_front(&bufs, 0);
        list.push_front(&bufs, 2);
        list.push_front(&bufs, 1);

        assert_eq!(list.iter(&bufs).collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(list.find(&bufs, BlockId::new(1, 26)), Some(2));
        assert_eq!(list.find(&bufs, BlockId::new(2, 26)), None);
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let bufs = slots(4);
        let bucket = Bucket::new();
        let mut list = bucket.lock();
        for slot in 0..4 {
            list.push_front(&bufs, slot);
        }
        // 3 -> 2 -> 1 -> 0

        list.remove(&bufs, 3);
        assert_eq!(list.iter(&bufs).collect::<Vec<_>>(), vec![2, 1, 0]);
        assert_eq!(bufs[2].prev(), None);

        list.remove(&bufs, 1);
        assert_eq!(list.iter(&bufs).collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(bufs[0].prev(), Some(2));

        list.remove(&bufs, 0);
        assert_eq!(list.iter(&bufs).collect::<Vec<_>>(), vec![2]);

        list.remove(&bufs, 2);
        assert_eq!(list.len(&bufs), 0);
        assert_eq!(bufs[2].next(), None);
    }

    #[test]
    fn test_reinsert_after_remove() {
        let bufs = slots(2);
        let bucket = Bucket::new();
        let mut list = bucket.lock();
        list.push_front(&bufs, 0);
        list.push_front(&bufs, 1);
        list.remove(&bufs, 0);
        list.push_front(&bufs, 0);
        assert_eq!(list.iter(&bufs).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(bufs[1].prev(), Some(0));
        assert_eq!(bufs[1].next(), None);
    }
}
