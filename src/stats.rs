//! Cache counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics. Relaxed ordering: these are metrics, not synchronization.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    recycles: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
    exhausted: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self, recycled: bool) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        if recycled {
            self.recycles.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_disk_read(&self) {
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_write(&self) {
        self.disk_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn get_recycles(&self) -> u64 {
        self.recycles.load(Ordering::Relaxed)
    }

    pub fn get_disk_reads(&self) -> u64 {
        self.disk_reads.load(Ordering::Relaxed)
    }

    pub fn get_disk_writes(&self) -> u64 {
        self.disk_writes.load(Ordering::Relaxed)
    }

    pub fn get_exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.get_hits();
        let total = hits + self.get_misses();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.get_hits(),
            misses: self.get_misses(),
            recycles: self.get_recycles(),
            disk_reads: self.get_disk_reads(),
            disk_writes: self.get_disk_writes(),
            exhausted: self.get_exhausted(),
            hit_rate: self.hit_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub recycles: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub exhausted: u64,
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_miss(false);
        stats.record_hit();
        stats.record_hit();
        stats.record_miss(true);

        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(stats.get_recycles(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = CacheStats::default();
        stats.record_disk_read();
        stats.record_disk_write();
        stats.record_exhausted();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.disk_reads, 1);
        assert_eq!(snapshot.exhausted, 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["disk_writes"], 1);
    }
}
