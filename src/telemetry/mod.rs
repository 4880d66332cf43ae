//! Pool observability: task counters and latency percentiles.

pub mod metrics;

pub use metrics::{MetricsSnapshot, PoolMetrics, PoolStatus};
