//! Driver metrics: operation counters and latency histograms.
//!
//! Process-wide, lock-free sinks updated by the driver and readable at any
//! time via [`snapshot`]. There is no exporter; hosts scrape the snapshot
//! into whatever registry they run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Number of latency buckets; bucket `i` covers `[2^(i-1), 2^i)` ms, with
/// bucket 0 covering `< 1` ms and the last bucket open-ended.
pub const HISTOGRAM_BUCKETS: usize = 16;

/// A fixed-bucket latency histogram with power-of-two bounds.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; HISTOGRAM_BUCKETS],
    count: AtomicU64,
    sum_ms: AtomicU64,
}

impl LatencyHistogram {
    pub fn observe(&self, latency: Duration) {
        let ms = latency.as_millis().min(u64::MAX as u128) as u64;
        let index = if ms == 0 {
            0
        } else {
            (64 - ms.leading_zeros() as usize).min(HISTOGRAM_BUCKETS - 1)
        };
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ms(&self) -> u64 {
        self.sum_ms.load(Ordering::Relaxed)
    }

    pub fn buckets(&self) -> [u64; HISTOGRAM_BUCKETS] {
        let mut out = [0u64; HISTOGRAM_BUCKETS];
        for (slot, bucket) in out.iter_mut().zip(self.buckets.iter()) {
            *slot = bucket.load(Ordering::Relaxed);
        }
        out
    }
}

/// All driver counters and histograms.
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// Payload bytes received by reads.
    pub bytes_read: AtomicU64,
    /// Payload bytes sent by writes.
    pub bytes_written: AtomicU64,
    /// Scheduled retries, across all operation kinds.
    pub retries: AtomicU64,
    /// Read calls.
    pub read: AtomicU64,
    /// Write calls.
    pub write: AtomicU64,
    /// Range-delete calls.
    pub delete_range: AtomicU64,
    /// List calls.
    pub list: AtomicU64,
    /// Read latency, request start to response finish.
    pub read_latency_ms: LatencyHistogram,
    /// Write latency, request start to response finish.
    pub write_latency_ms: LatencyHistogram,
}

static METRICS: DriverMetrics = DriverMetrics {
    bytes_read: AtomicU64::new(0),
    bytes_written: AtomicU64::new(0),
    retries: AtomicU64::new(0),
    read: AtomicU64::new(0),
    write: AtomicU64::new(0),
    delete_range: AtomicU64::new(0),
    list: AtomicU64::new(0),
    read_latency_ms: LatencyHistogram {
        buckets: [const { AtomicU64::new(0) }; HISTOGRAM_BUCKETS],
        count: AtomicU64::new(0),
        sum_ms: AtomicU64::new(0),
    },
    write_latency_ms: LatencyHistogram {
        buckets: [const { AtomicU64::new(0) }; HISTOGRAM_BUCKETS],
        count: AtomicU64::new(0),
        sum_ms: AtomicU64::new(0),
    },
};

/// The process-wide driver metrics.
pub fn metrics() -> &'static DriverMetrics {
    &METRICS
}

pub(crate) fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn add(counter: &AtomicU64, amount: u64) {
    counter.fetch_add(amount, Ordering::Relaxed);
}

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub retries: u64,
    pub read: u64,
    pub write: u64,
    pub delete_range: u64,
    pub list: u64,
    pub read_latency_count: u64,
    pub write_latency_count: u64,
}

/// Capture the current counter values.
pub fn snapshot() -> MetricsSnapshot {
    let m = metrics();
    MetricsSnapshot {
        bytes_read: m.bytes_read.load(Ordering::Relaxed),
        bytes_written: m.bytes_written.load(Ordering::Relaxed),
        retries: m.retries.load(Ordering::Relaxed),
        read: m.read.load(Ordering::Relaxed),
        write: m.write.load(Ordering::Relaxed),
        delete_range: m.delete_range.load(Ordering::Relaxed),
        list: m.list.load(Ordering::Relaxed),
        read_latency_count: m.read_latency_ms.count(),
        write_latency_count: m.write_latency_ms.count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_bucket_placement() {
        let histogram = LatencyHistogram::default();
        histogram.observe(Duration::from_millis(0));
        histogram.observe(Duration::from_millis(1));
        histogram.observe(Duration::from_millis(3));
        histogram.observe(Duration::from_millis(100));

        let buckets = histogram.buckets();
        assert_eq!(buckets[0], 1); // 0ms
        assert_eq!(buckets[1], 1); // 1ms -> [1, 2)
        assert_eq!(buckets[2], 1); // 3ms -> [2, 4)
        assert_eq!(buckets[7], 1); // 100ms -> [64, 128)
        assert_eq!(histogram.count(), 4);
        assert_eq!(histogram.sum_ms(), 104);
    }

    #[test]
    fn test_histogram_large_values_clamp_to_last_bucket() {
        let histogram = LatencyHistogram::default();
        histogram.observe(Duration::from_secs(3600));
        assert_eq!(histogram.buckets()[HISTOGRAM_BUCKETS - 1], 1);
    }

    #[test]
    fn test_snapshot_reflects_counters() {
        let before = snapshot();
        increment(&metrics().read);
        add(&metrics().bytes_read, 42);
        let after = snapshot();
        assert_eq!(after.read, before.read + 1);
        assert_eq!(after.bytes_read, before.bytes_read + 42);
    }
}
