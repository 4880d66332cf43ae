//! Task counters and execution latency for a pool.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One hour in nanoseconds; slower attempts are clamped to this.
const MAX_TRACKED_LATENCY_NS: u64 = 3_600_000_000_000;

/// Pool metrics collector
#[derive(Debug)]
pub struct PoolMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,

    // time spent inside task callables, failed attempts included
    busy_time_ns: AtomicU64,

    // latency of successful attempts
    latency_histogram: Option<RwLock<Histogram<u64>>>,

    start_time: Instant,
}

impl PoolMetrics {
    pub fn new() -> Self {
        let latency_histogram = match Histogram::new_with_max(MAX_TRACKED_LATENCY_NS, 3) {
            Ok(histogram) => Some(RwLock::new(histogram)),
            Err(err) => {
                tracing::warn!(error = ?err, "latency histogram unavailable");
                None
            }
        };

        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            busy_time_ns: AtomicU64::new(0),
            latency_histogram,
            start_time: Instant::now(),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, elapsed: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let ns = self.record_busy(elapsed);
        if let Some(histogram) = &self.latency_histogram {
            let _ = histogram.write().record(ns.clamp(1, MAX_TRACKED_LATENCY_NS));
        }
    }

    pub fn record_retried(&self, elapsed: Duration) {
        self.retried.fetch_add(1, Ordering::Relaxed);
        self.record_busy(elapsed);
    }

    pub fn record_failed(&self, elapsed: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_busy(elapsed);
    }

    fn record_busy(&self, elapsed: Duration) -> u64 {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.busy_time_ns.fetch_add(ns, Ordering::Relaxed);
        ns
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let status = self.status();
        let mut snapshot = MetricsSnapshot {
            timestamp: Instant::now(),
            uptime: self.start_time.elapsed(),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: status.completed,
            retried: status.retried,
            failed: status.failed,
            busy_time_ns: self.busy_time_ns.load(Ordering::Relaxed),
            avg_latency_ns: 0,
            p50_latency_ns: 0,
            p95_latency_ns: 0,
            p99_latency_ns: 0,
            max_latency_ns: 0,
        };

        if let Some(histogram) = &self.latency_histogram {
            let histogram = histogram.read();
            if histogram.len() > 0 {
                snapshot.avg_latency_ns = histogram.mean() as u64;
                snapshot.p50_latency_ns = histogram.value_at_quantile(0.50);
                snapshot.p95_latency_ns = histogram.value_at_quantile(0.95);
                snapshot.p99_latency_ns = histogram.value_at_quantile(0.99);
                snapshot.max_latency_ns = histogram.max();
            }
        }

        snapshot
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.retried.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.busy_time_ns.store(0, Ordering::Relaxed);

        if let Some(histogram) = &self.latency_histogram {
            histogram.write().reset();
        }
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Failed, retried and completed task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub failed: u64,
    pub retried: u64,
    pub completed: u64,
}

impl PoolStatus {
    /// `(failed, retried, completed)`
    pub fn as_tuple(&self) -> (u64, u64, u64) {
        (self.failed, self.retried, self.completed)
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: Instant,
    pub uptime: Duration,
    pub submitted: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    pub busy_time_ns: u64,
    pub avg_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p95_latency_ns: u64,
    pub p99_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl MetricsSnapshot {
    /// Completed tasks per second of pool uptime
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.completed as f64 / seconds
    }

    /// Share of settled tasks that failed for good (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        let settled = self.completed + self.failed;
        if settled == 0 {
            return 0.0;
        }
        self.failed as f64 / settled as f64
    }
}
