use crate::buf::BlockId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cache exhausted: all {capacity} buffers are referenced")]
    CacheExhausted { capacity: usize },

    #[error("{op}: caller does not hold the buffer lock for block {id}")]
    LockContractViolation { op: &'static str, id: BlockId },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown device: {0}")]
    UnknownDevice(u32),

    #[error("Block {block} out of range for device {device} ({blocks} blocks)")]
    BlockOutOfRange { device: u32, block: u32, blocks: u64 },

    #[error("Block size mismatch: expected {expected} bytes, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Faults that mean the cache can no longer make progress. Callers are
    /// expected to abort the enclosing operation chain, never retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CacheExhausted { .. } | Error::LockContractViolation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let id = BlockId::new(1, 5);
        assert!(Error::CacheExhausted { capacity: 2 }.is_fatal());
        assert!(Error::LockContractViolation { op: "bwrite", id }.is_fatal());
        assert!(!Error::UnknownDevice(3).is_fatal());
        assert!(!Error::ConfigError("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::LockContractViolation {
            op: "brelse",
            id: BlockId::new(1, 5),
        };
        assert_eq!(
            err.to_string(),
            "brelse: caller does not hold the buffer lock for block 1:5"
        );
    }
}
