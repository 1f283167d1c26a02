//! Hammers a block cache from every core and checks that no increment is lost.
//!
//! Environment:
//! - `BCACHE_BUFFERS`, `BCACHE_BUCKETS`, `BCACHE_BLOCK_SIZE`: cache shape
//! - `BCACHE_STRESS_FILE`: back the cache with a disk image instead of memory
//! - `BCACHE_STRESS_ROUNDS`: read/modify/write cycles per worker

use anyhow::{bail, Context, Result};
use bcache::{BlockCache, CacheConfig, DiskTransfer, FileDisk, MemDisk};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEVICE: u32 = 1;
const DEFAULT_ROUNDS: u64 = 10_000;

fn counter(data: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[..8]);
    u64::from_le_bytes(raw)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bcache=info,bcache_stress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env().context("loading cache config")?;
    let rounds = match std::env::var("BCACHE_STRESS_ROUNDS") {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("invalid BCACHE_STRESS_ROUNDS: {raw:?}"))?,
        Err(_) => DEFAULT_ROUNDS,
    };

    // Each worker holds at most one buffer at a time, so this many workers
    // can never exhaust the pool.
    let workers = num_cpus::get().min(config.buffer_count);
    let blocks = (config.buffer_count / 2).max(1) as u32;

    let disk: Arc<dyn DiskTransfer> = match std::env::var("BCACHE_STRESS_FILE") {
        Ok(path) => Arc::new(
            FileDisk::create(&path, DEVICE, config.block_size, u64::from(blocks))
                .with_context(|| format!("creating disk image {path}"))?,
        ),
        Err(_) => Arc::new(MemDisk::new(config.block_size)),
    };
    let cache = BlockCache::new(config, disk)?;

    info!(workers, blocks, rounds, "starting stress run");
    let started = Instant::now();

    thread::scope(|s| -> Result<()> {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let cache = &cache;
                s.spawn(move || -> Result<()> {
                    let mut rng = rand::thread_rng();
                    for _ in 0..rounds {
                        let mut buf = cache.read(DEVICE, rng.gen_range(0..blocks))?;
                        let next = counter(&buf) + 1;
                        buf[..8].copy_from_slice(&next.to_le_bytes());
                        cache.write(&buf)?;
                        cache.release(buf)?;
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => bail!("stress worker panicked"),
            }
        }
        Ok(())
    })?;

    let elapsed = started.elapsed();
    let mut total = 0;
    for block in 0..blocks {
        total += counter(&cache.read(DEVICE, block)?);
    }
    let expected = workers as u64 * rounds;
    if total != expected {
        bail!("lost updates: counted {total}, expected {expected}");
    }

    info!(
        elapsed_ms = elapsed.as_millis() as u64,
        ops_per_sec = (expected as f64 / elapsed.as_secs_f64()) as u64,
        hit_rate = cache.stats().hit_rate(),
        "stress run verified"
    );
    println!("{}", serde_json::to_string_pretty(&cache.stats().snapshot())?);
    Ok(())
}
