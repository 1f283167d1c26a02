//! The block cache.
//!
//! Lock order is bucket spinlock, then (only on a miss) the pool spinlock
//! nested inside it. Both are dropped before a buffer's sleep lock is taken,
//! and only the sleep lock is ever held across disk I/O.

use crate::bucket::Bucket;
use crate::buf::{BlockId, BufGuard, PinnedBuf};
use crate::config::CacheConfig;
use crate::disk::{DiskTransfer, Transfer};
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::stats::CacheStats;
use crossbeam::utils::CachePadded;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Sharded cache of fixed-size disk blocks over a fixed pool of buffers.
///
/// Build one at startup and share it by reference (or `Arc`) with every
/// thread that needs block access.
pub struct BlockCache {
    config: CacheConfig,
    pool: Pool,
    buckets: Box<[CachePadded<Bucket>]>,
    disk: Arc<dyn DiskTransfer>,
    stats: CacheStats,
}

impl BlockCache {
    pub fn new(config: CacheConfig, disk: Arc<dyn DiskTransfer>) -> Result<Self> {
        config.validate()?;
        debug!(
            buffers = config.buffer_count,
            buckets = config.bucket_count,
            block_size = config.block_size,
            "initializing block cache"
        );

        Ok(Self {
            pool: Pool::new(config.buffer_count, config.block_size),
            buckets: (0..config.bucket_count)
                .map(|_| CachePadded::new(Bucket::new()))
                .collect(),
            disk,
            stats: CacheStats::default(),
            config,
        })
    }

    #[inline]
    fn bucket_index(&self, block: u32) -> usize {
        block as usize % self.buckets.len()
    }

    #[inline]
    fn bucket(&self, block: u32) -> &Bucket {
        &self.buckets[self.bucket_index(block)]
    }

    /// Look `device`/`block` up, recycling a free buffer on a miss, and return
    /// it with its exclusive lock held. No disk I/O happens here; the payload
    /// is only meaningful once [`BufGuard::is_valid`] is true.
    ///
    /// Parks the caller while another thread holds the buffer. Fails with
    /// [`Error::CacheExhausted`] when the block is not cached and every
    /// buffer is referenced.
    pub fn get(&self, device: u32, block: u32) -> Result<BufGuard<'_>> {
        let id = BlockId::new(device, block);
        let bufs = self.pool.bufs();
        let mut list = self.bucket(block).lock();

        if let Some(slot) = list.find(bufs, id) {
            bufs[slot].take_ref();
            drop(list);
            self.stats.record_hit();
            trace!(%id, slot, "cache hit");
            return Ok(self.lock_slot(slot, id));
        }

        let Some(claim) = self.pool.claim(id) else {
            drop(list);
            self.stats.record_exhausted();
            error!(%id, capacity = self.pool.len(), "bget: no buffers");
            return Err(Error::CacheExhausted {
                capacity: self.pool.len(),
            });
        };
        list.push_front(bufs, claim.slot);
        drop(list);

        self.stats.record_miss(claim.evicted.is_some());
        trace!(%id, slot = claim.slot, evicted = ?claim.evicted, "cache miss");
        Ok(self.lock_slot(claim.slot, id))
    }

    fn lock_slot(&self, slot: usize, id: BlockId) -> BufGuard<'_> {
        let data = self.pool.buf(slot).data.lock();
        BufGuard::new(self, slot, id, data)
    }

    /// [`get`](Self::get), then fill the payload from disk unless it is
    /// already valid.
    pub fn read(&self, device: u32, block: u32) -> Result<BufGuard<'_>> {
        let mut buf = self.get(device, block)?;
        if !buf.is_valid() {
            let id = buf.id();
            self.disk.transfer(id, Transfer::Read(buf.data_mut()))?;
            buf.set_valid();
            self.stats.record_disk_read();
            debug!(%id, slot = buf.slot(), "read block from disk");
        }
        Ok(buf)
    }

    /// Write the payload to disk, whether or not it was ever read. The
    /// calling thread must be the one holding the buffer's lock.
    pub fn write(&self, buf: &BufGuard<'_>) -> Result<()> {
        if !buf.belongs_to(self) || !buf.is_held_by_caller() {
            return Err(self.lock_violation("bwrite", buf.id()));
        }
        self.disk.transfer(buf.id(), Transfer::Write(buf.data()))?;
        self.stats.record_disk_write();
        debug!(id = %buf.id(), slot = buf.slot(), "wrote block to disk");
        Ok(())
    }

    /// Release the exclusive lock and drop the reference. The last reference
    /// detaches the buffer from its bucket, making it recyclable.
    ///
    /// Dropping the guard does the same; this form reports violations. A
    /// guard taken from a different cache is rejected without touching this
    /// cache, but it is still consumed: dropping it releases the buffer in
    /// the cache it came from.
    pub fn release(&self, mut buf: BufGuard<'_>) -> Result<()> {
        if !buf.belongs_to(self) {
            return Err(self.lock_violation("brelse", buf.id()));
        }
        buf.release_inner();
        Ok(())
    }

    /// Take an extra reference that keeps the buffer resident until the
    /// returned pin is unpinned or dropped. Does not touch the exclusive lock.
    pub fn pin(&self, buf: &BufGuard<'_>) -> Result<PinnedBuf<'_>> {
        if !buf.belongs_to(self) {
            return Err(self.lock_violation("bpin", buf.id()));
        }
        let slot = buf.slot();
        let _list = self.bucket(buf.id().block).lock();
        self.pool.buf(slot).take_ref();
        Ok(PinnedBuf::new(self, slot, buf.id()))
    }

    pub fn unpin(&self, mut pin: PinnedBuf<'_>) {
        pin.unpin_inner();
    }

    /// Drop one reference under the bucket lock, detaching on the last one.
    pub(crate) fn put_ref(&self, slot: usize, id: BlockId) {
        let bufs = self.pool.bufs();
        let buf = &bufs[slot];
        let mut list = self.bucket(id.block).lock();

        if buf.ref_count() > 1 {
            buf.drop_ref();
        } else {
            list.remove(bufs, slot);
            buf.free();
            debug!(%id, slot, "buffer detached");
        }
    }

    pub(crate) fn lock_violation(&self, op: &'static str, id: BlockId) -> Error {
        error!(%id, op, "buffer lock not held by caller");
        Error::LockContractViolation { op, id }
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Reference count of a resident block, without taking a reference.
    pub fn ref_count(&self, device: u32, block: u32) -> Option<u32> {
        let id = BlockId::new(device, block);
        let bufs = self.pool.bufs();
        let list = self.bucket(block).lock();
        list.find(bufs, id).map(|slot| bufs[slot].ref_count())
    }

    pub fn contains(&self, device: u32, block: u32) -> bool {
        self.ref_count(device, block).is_some()
    }

    /// Identities of every attached buffer, bucket by bucket.
    pub fn resident(&self) -> Vec<BlockId> {
        let bufs = self.pool.bufs();
        self.buckets
            .iter()
            .flat_map(|bucket| {
                let list = bucket.lock();
                list.iter(bufs).map(|slot| bufs[slot].id()).collect::<Vec<_>>()
            })
            .collect()
    }

    /// Buffers currently linked into the bucket at `index`.
    pub fn bucket_len(&self, index: usize) -> usize {
        self.buckets[index].lock().len(self.pool.bufs())
    }

    /// Bucket a block index hashes to. The device does not take part.
    pub fn bucket_of(&self, block: u32) -> usize {
        self.bucket_index(block)
    }

    /// Buffers with no references, i.e. candidates for recycling.
    pub fn free_buffers(&self) -> usize {
        self.pool.free_count()
    }

    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
