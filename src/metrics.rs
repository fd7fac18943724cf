//! Server Metrics
//!
//! Per-command operation counters and coarse latency tracking, shared by
//! the socket front-ends. Also the source of the process uptime reported
//! by the info endpoints.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    total_ops: AtomicU64,
    ops_by_command: RwLock<HashMap<String, u64>>,
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_ops: AtomicU64::new(0),
            ops_by_command: RwLock::new(HashMap::new()),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }

    /// Record one executed command and how long it took.
    pub fn record(&self, command: &str, latency: Duration) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);

        {
            let mut ops = self.ops_by_command.write().unwrap();
            *ops.entry(command.to_string()).or_insert(0) += 1;
        }

        self.latency_sum_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }

    pub fn ops_by_command(&self) -> HashMap<String, u64> {
        self.ops_by_command.read().unwrap().clone()
    }

    pub fn avg_latency_us(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.latency_sum_us.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Time since the server process came up.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// One-line summary, logged at shutdown.
    pub fn summary(&self) -> String {
        format!(
            "ops={} avg_latency_us={:.1} uptime_secs={}",
            self.total_ops(),
            self.avg_latency_us(),
            self.uptime().as_secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_counters() {
        let metrics = Metrics::new();

        metrics.record("GET", Duration::from_micros(100));
        metrics.record("GET", Duration::from_micros(200));
        metrics.record("SET", Duration::from_micros(150));

        assert_eq!(metrics.total_ops(), 3);
        assert!((metrics.avg_latency_us() - 150.0).abs() < 0.1);

        let by_cmd = metrics.ops_by_command();
        assert_eq!(by_cmd.get("GET"), Some(&2));
        assert_eq!(by_cmd.get("SET"), Some(&1));
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = Metrics::new();
        assert_eq!(metrics.total_ops(), 0);
        assert_eq!(metrics.avg_latency_us(), 0.0);
        assert!(metrics.summary().starts_with("ops=0"));
    }
}
