//! Prometheus metrics for SlabCache

use crate::storage::{EVICTED_KEYS, EXPIRED_KEYS_REMOVED};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::atomic::Ordering;

/// Global metrics instance
pub struct Metrics {
    pub registry: Registry,

    // Command counters
    pub cmd_insert: IntCounter,
    pub cmd_fetch: IntCounter,
    pub cmd_remove: IntCounter,

    // Hit/miss counters
    pub fetch_hits: IntCounter,
    pub fetch_misses: IntCounter,

    // Connection metrics
    pub active_connections: IntGauge,
    pub total_connections: IntCounter,
    pub rejected_connections: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    // Latency histograms
    pub cmd_latency: Histogram,

    // Error counters
    pub protocol_errors: IntCounter,
    pub oom_errors: IntCounter,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let cmd_insert =
            IntCounter::new("slabcache_cmd_insert_total", "Total set commands").unwrap();
        let cmd_fetch = IntCounter::new("slabcache_cmd_fetch_total", "Total get commands").unwrap();
        let cmd_remove =
            IntCounter::new("slabcache_cmd_remove_total", "Total delete commands").unwrap();

        let fetch_hits = IntCounter::new("slabcache_fetch_hits_total", "Total get hits").unwrap();
        let fetch_misses =
            IntCounter::new("slabcache_fetch_misses_total", "Total get misses").unwrap();

        let active_connections =
            IntGauge::new("slabcache_active_connections", "Current active connections").unwrap();
        let total_connections =
            IntCounter::new("slabcache_connections_total", "Total connections accepted").unwrap();
        let rejected_connections = IntCounter::new(
            "slabcache_rejected_connections_total",
            "Total connections rejected",
        )
        .unwrap();

        let bytes_read = IntCounter::new("slabcache_bytes_read_total", "Total bytes read").unwrap();
        let bytes_written =
            IntCounter::new("slabcache_bytes_written_total", "Total bytes written").unwrap();

        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new("slabcache_cmd_latency_seconds", "Command latency in seconds")
                .buckets(vec![
                    0.0001, 0.0005, 0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ]),
        )
        .unwrap();

        let protocol_errors =
            IntCounter::new("slabcache_protocol_errors_total", "Total protocol errors").unwrap();
        let oom_errors = IntCounter::new(
            "slabcache_oom_errors_total",
            "Allocation failures reported to clients",
        )
        .unwrap();

        // Register all metrics
        registry.register(Box::new(cmd_insert.clone())).unwrap();
        registry.register(Box::new(cmd_fetch.clone())).unwrap();
        registry.register(Box::new(cmd_remove.clone())).unwrap();
        registry.register(Box::new(fetch_hits.clone())).unwrap();
        registry.register(Box::new(fetch_misses.clone())).unwrap();
        registry
            .register(Box::new(active_connections.clone()))
            .unwrap();
        registry
            .register(Box::new(total_connections.clone()))
            .unwrap();
        registry
            .register(Box::new(rejected_connections.clone()))
            .unwrap();
        registry.register(Box::new(bytes_read.clone())).unwrap();
        registry.register(Box::new(bytes_written.clone())).unwrap();
        registry.register(Box::new(cmd_latency.clone())).unwrap();
        registry
            .register(Box::new(protocol_errors.clone()))
            .unwrap();
        registry.register(Box::new(oom_errors.clone())).unwrap();

        Self {
            registry,
            cmd_insert,
            cmd_fetch,
            cmd_remove,
            fetch_hits,
            fetch_misses,
            active_connections,
            total_connections,
            rejected_connections,
            bytes_read,
            bytes_written,
            cmd_latency,
            protocol_errors,
            oom_errors,
        }
    }

    /// Get Prometheus formatted metrics
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        let mut output = String::from_utf8(buffer).unwrap();

        // Add storage lifecycle stats (from static counters)
        let expired_removed = EXPIRED_KEYS_REMOVED.load(Ordering::Relaxed);
        let evicted = EVICTED_KEYS.load(Ordering::Relaxed);

        output.push_str(&format!(
            "\n# HELP slabcache_expired_keys_removed_total Keys removed by lazy expiration\n\
             # TYPE slabcache_expired_keys_removed_total counter\n\
             slabcache_expired_keys_removed_total {expired_removed}\n"
        ));

        output.push_str(&format!(
            "\n# HELP slabcache_evicted_keys_total Keys evicted under memory pressure\n\
             # TYPE slabcache_evicted_keys_total counter\n\
             slabcache_evicted_keys_total {evicted}\n"
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        metrics.cmd_fetch.inc();
        metrics.cmd_insert.inc();
        metrics.fetch_hits.inc();
        metrics.active_connections.set(5);

        let output = metrics.gather();
        assert!(output.contains("slabcache_cmd_fetch_total"));
        assert!(output.contains("slabcache_active_connections"));
        assert!(output.contains("slabcache_evicted_keys_total"));
    }
}
