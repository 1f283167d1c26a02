//! Cache configuration
//!
//! Defaults mirror a small kernel build: 30 buffers of 1 KiB spread over 13
//! buckets. Values can be overridden from the environment or a JSON document,
//! and are validated before a cache is built from them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BUFFERS: usize = 30;
pub const DEFAULT_BUCKETS: usize = 13;
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

const MIN_BLOCK_SIZE: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of buffers in the pool. Fixed for the life of the cache.
    pub buffer_count: usize,

    /// Number of hash buckets. A prime keeps sequential block runs spread out.
    pub bucket_count: usize,

    /// Payload size of every buffer in bytes
    pub block_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFERS,
            bucket_count: DEFAULT_BUCKETS,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CacheConfig {
    /// Defaults with `BCACHE_BUFFERS`, `BCACHE_BUCKETS` and `BCACHE_BLOCK_SIZE`
    /// applied on top.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid cache config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(n) = env_usize("BCACHE_BUFFERS")? {
            self.buffer_count = n;
        }
        if let Some(n) = env_usize("BCACHE_BUCKETS")? {
            self.bucket_count = n;
        }
        if let Some(n) = env_usize("BCACHE_BLOCK_SIZE")? {
            self.block_size = n;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(Error::ConfigError(
                "buffer_count must be at least 1".to_string(),
            ));
        }
        if self.bucket_count == 0 {
            return Err(Error::ConfigError(
                "bucket_count must be at least 1".to_string(),
            ));
        }
        if self.block_size < MIN_BLOCK_SIZE || !self.block_size.is_power_of_two() {
            return Err(Error::ConfigError(format!(
                "Invalid block_size: {}. Must be a power of two >= {}",
                self.block_size, MIN_BLOCK_SIZE
            )));
        }
        Ok(())
    }

    /// Bytes of payload memory the pool pins for its lifetime.
    pub fn payload_bytes(&self) -> usize {
        self.buffer_count * self.block_size
    }
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::ConfigError(format!("Invalid {}: {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}

/// Configuration builder for programmatic setup
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffers(mut self, count: usize) -> Self {
        self.config.buffer_count = count;
        self
    }

    pub fn with_buckets(mut self, count: usize) -> Self {
        self.config.bucket_count = count;
        self
    }

    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.config.block_size = bytes;
        self
    }

    pub fn build(self) -> Result<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.buffer_count, 30);
        assert_eq!(config.bucket_count, 13);
        assert_eq!(config.block_size, 1024);
        assert!(config.validate().is_ok());
        assert_eq!(config.payload_bytes(), 30 * 1024);
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfigBuilder::new()
            .with_buffers(2)
            .with_buckets(1)
            .with_block_size(4096)
            .build()
            .unwrap();

        assert_eq!(config.buffer_count, 2);
        assert_eq!(config.bucket_count, 1);
        assert_eq!(config.block_size, 4096);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(CacheConfigBuilder::new().with_buffers(0).build().is_err());
        assert!(CacheConfigBuilder::new().with_buckets(0).build().is_err());
        assert!(CacheConfigBuilder::new().with_block_size(1000).build().is_err());
        assert!(CacheConfigBuilder::new().with_block_size(256).build().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = CacheConfig::from_json(r#"{ "buffer_count": 64 }"#).unwrap();
        assert_eq!(config.buffer_count, 64);
        assert_eq!(config.bucket_count, DEFAULT_BUCKETS);

        let err = CacheConfig::from_json(r#"{ "block_size": 3 }"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(CacheConfig::from_json("not json").is_err());
    }
}
