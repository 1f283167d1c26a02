//! Block buffer cache
//!
//! Caches fixed-size disk blocks in a fixed pool of buffers and serializes
//! access so that one thread at a time observes or mutates a block's bytes.
//!
//! Interface:
//! - [`BlockCache::read`] returns a locked buffer holding the block's content.
//! - After changing the payload, [`BlockCache::write`] sends it to disk.
//! - [`BlockCache::release`] (or dropping the guard) gives the buffer back.
//! - [`BlockCache::pin`] keeps a buffer resident across release cycles.
//!
//! Only one thread at a time can hold a buffer, so do not keep guards longer
//! than necessary.

pub mod buf;
pub mod cache;
pub mod config;
pub mod disk;
pub mod error;
pub mod stats;
pub mod sync;

mod bucket;
mod pool;

pub use buf::{BlockId, BufGuard, PinnedBuf};
pub use cache::BlockCache;
pub use config::{CacheConfig, CacheConfigBuilder};
pub use disk::{DiskTransfer, FileDisk, MemDisk, Transfer};
pub use error::{Error, Result};
pub use stats::{CacheStats, CacheStatsSnapshot};
