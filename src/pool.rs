//! Fixed pool of buffer slots and the recycling scan.

use crate::buf::{BlockId, Buf};
use crate::sync::SpinLock;
use tracing::trace;

/// Result of a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Claim {
    pub slot: usize,
    /// Identity the slot held before this claim, if it had one.
    pub evicted: Option<BlockId>,
}

/// All buffers, allocated once. The pool lock only serializes the free scan.
pub(crate) struct Pool {
    bufs: Box<[Buf]>,
    lock: SpinLock<()>,
}

impl Pool {
    pub(crate) fn new(count: usize, block_size: usize) -> Self {
        Self {
            bufs: (0..count).map(|_| Buf::new(block_size)).collect(),
            lock: SpinLock::new("bcache", ()),
        }
    }

    #[inline]
    pub(crate) fn bufs(&self) -> &[Buf] {
        &self.bufs
    }

    #[inline]
    pub(crate) fn buf(&self, slot: usize) -> &Buf {
        &self.bufs[slot]
    }

    pub(crate) fn len(&self) -> usize {
        self.bufs.len()
    }

    /// Take the lowest-index unreferenced slot and give it identity `id`.
    ///
    /// Must be called with the target bucket's lock held; the caller links
    /// the slot into that bucket before unlocking it. `None` means every slot
    /// is referenced.
    pub(crate) fn claim(&self, id: BlockId) -> Option<Claim> {
        let slot = {
            let _scan = self.lock.lock();
            self.bufs.iter().position(Buf::try_claim)?
        };

        let evicted = self.bufs[slot].assign(id);
        trace!(%id, slot, ?evicted, "claimed buffer");
        Some(Claim { slot, evicted })
    }

    /// Slots with no references.
    pub(crate) fn free_count(&self) -> usize {
        self.bufs.iter().filter(|buf| buf.ref_count() == 0).count()
    }
}
