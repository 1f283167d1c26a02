//! Disk transfer collaborators.
//!
//! The cache never touches storage itself. It hands one block at a time to a
//! [`DiskTransfer`] while holding that buffer's exclusive lock.

use crate::buf::BlockId;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Direction and payload of a single-block transfer.
#[derive(Debug)]
pub enum Transfer<'a> {
    /// Fill the payload from the device.
    Read(&'a mut [u8]),
    /// Persist the payload to the device.
    Write(&'a [u8]),
}

impl Transfer<'_> {
    pub fn len(&self) -> usize {
        match self {
            Transfer::Read(buf) => buf.len(),
            Transfer::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Transfer::Write(_))
    }
}

/// Synchronous single-block device access.
pub trait DiskTransfer: Send + Sync {
    /// Move exactly one block between `id` on disk and the payload. Blocks the
    /// calling thread until the transfer completes.
    fn transfer(&self, id: BlockId, op: Transfer<'_>) -> Result<()>;
}

fn check_len(expected: usize, op: &Transfer<'_>) -> Result<()> {
    if op.len() != expected {
        return Err(Error::BlockSizeMismatch {
            expected,
            actual: op.len(),
        });
    }
    Ok(())
}

/// In-memory device set. Unwritten blocks read as zeros.
#[derive(Debug)]
pub struct MemDisk {
    block_size: usize,
    blocks: Mutex<HashMap<BlockId, Box<[u8]>>>,
    latency: Option<Duration>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemDisk {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Mutex::new(HashMap::new()),
            latency: None,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Sleep for `latency` inside every transfer, like a slow device would.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Seed on-disk content without going through the cache.
    pub fn put_block(&self, id: BlockId, data: &[u8]) -> Result<()> {
        check_len(self.block_size, &Transfer::Write(data))?;
        self.blocks.lock().insert(id, data.into());
        Ok(())
    }

    /// On-disk content of `id`, if it was ever written.
    pub fn block(&self, id: BlockId) -> Option<Vec<u8>> {
        self.blocks.lock().get(&id).map(|b| b.to_vec())
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl DiskTransfer for MemDisk {
    fn transfer(&self, id: BlockId, op: Transfer<'_>) -> Result<()> {
        check_len(self.block_size, &op)?;
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        match op {
            Transfer::Read(buf) => {
                match self.blocks.lock().get(&id) {
                    Some(data) => buf.copy_from_slice(data),
                    None => buf.fill(0),
                }
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
            Transfer::Write(buf) => {
                self.blocks.lock().insert(id, buf.into());
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

/// A single device backed by a file, addressed with positional I/O so that
/// concurrent transfers never share a seek position.
#[derive(Debug)]
pub struct FileDisk {
    device: u32,
    file: File,
    block_size: usize,
    blocks: u64,
}

impl FileDisk {
    /// Create (or truncate) a zero-filled image of `blocks` blocks.
    pub fn create<P: AsRef<Path>>(
        path: P,
        device: u32,
        block_size: usize,
        blocks: u64,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(blocks * block_size as u64)?;
        Ok(Self {
            device,
            file,
            block_size,
            blocks,
        })
    }

    /// Open an existing image. A trailing partial block is ignored.
    pub fn open<P: AsRef<Path>>(path: P, device: u32, block_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let blocks = file.metadata()?.len() / block_size as u64;
        Ok(Self {
            device,
            file,
            block_size,
            blocks,
        })
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Flush written blocks to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn offset(&self, id: BlockId) -> Result<u64> {
        if id.device != self.device {
            return Err(Error::UnknownDevice(id.device));
        }
        if u64::from(id.block) >= self.blocks {
            return Err(Error::BlockOutOfRange {
                device: id.device,
                block: id.block,
                blocks: self.blocks,
            });
        }
        Ok(u64::from(id.block) * self.block_size as u64)
    }
}

impl DiskTransfer for FileDisk {
    fn transfer(&self, id: BlockId, op: Transfer<'_>) -> Result<()> {
        check_len(self.block_size, &op)?;
        let offset = self.offset(id)?;
        debug!(%id, offset, write = op.is_write(), "file transfer");

        match op {
            Transfer::Read(buf) => self.file.read_exact_at(buf, offset)?,
            Transfer::Write(buf) => self.file.write_all_at(buf, offset)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mem_disk_reads_zero_then_written_data() {
        let disk = MemDisk::new(512);
        let id = BlockId::new(1, 3);

        let mut buf = vec![0xffu8; 512];
        disk.transfer(id, Transfer::Read(&mut buf)).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        disk.transfer(id, Transfer::Write(&[7u8; 512])).unwrap();
        disk.transfer(id, Transfer::Read(&mut buf)).unwrap();
        assert_eq!(buf, vec![7u8; 512]);

        assert_eq!(disk.reads(), 2);
        assert_eq!(disk.writes(), 1);
        assert_eq!(disk.block(id), Some(vec![7u8; 512]));
    }

    #[test]
    fn test_transfer_len() {
        let mut buf = [0u8; 16];
        let read = Transfer::Read(&mut buf);
        assert_eq!(read.len(), 16);
        assert!(!read.is_empty());
        assert!(!read.is_write());

        let write = Transfer::Write(&[]);
        assert!(write.is_empty());
        assert!(write.is_write());
    }

    #[test]
    fn test_mem_disk_rejects_wrong_size() {
        let disk = MemDisk::new(512);
        let mut buf = vec![0u8; 100];
        let err = disk
            .transfer(BlockId::new(1, 0), Transfer::Read(&mut buf))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BlockSizeMismatch {
                expected: 512,
                actual: 100
            }
        ));
        assert_eq!(disk.reads(), 0);
    }

    #[test]
    fn test_file_disk_roundtrip_and_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("disk.img");
        let disk = FileDisk::create(&path, 1, 1024, 8).unwrap();
        assert_eq!(disk.blocks(), 8);

        disk.transfer(BlockId::new(1, 7), Transfer::Write(&[9u8; 1024]))
            .unwrap();
        disk.sync().unwrap();

        let reopened = FileDisk::open(&path, 1, 1024).unwrap();
        let mut buf = vec![0u8; 1024];
        reopened
            .transfer(BlockId::new(1, 7), Transfer::Read(&mut buf))
            .unwrap();
        assert_eq!(buf, vec![9u8; 1024]);

        assert!(matches!(
            reopened.transfer(BlockId::new(1, 8), Transfer::Read(&mut buf)),
            Err(Error::BlockOutOfRange { block: 8, .. })
        ));
        assert!(matches!(
            reopened.transfer(BlockId::new(2, 0), Transfer::Read(&mut buf)),
            Err(Error::UnknownDevice(2))
        ));
    }
}
