//! Prometheus Metrics for tiercache
//!
//! Process-wide export surface fed by every `StatsRecorder` with monitoring
//! enabled:
//! - Operations by layer, kind and outcome
//! - Per-layer latency histogram
//! - Local layer occupancy

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, TextEncoder, register_histogram_vec,
    register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    /// Total cache operations by layer, type and outcome
    pub static ref CACHE_OPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_operations_total",
        "Total number of cache operations by layer, type and outcome",
        &["layer", "operation", "outcome"]
    ).unwrap();

    /// Cache operation latency in seconds
    pub static ref CACHE_OP_DURATION: HistogramVec = register_histogram_vec!(
        "tiercache_operation_duration_seconds",
        "Cache operation latency in seconds",
        &["layer", "operation"],
        vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0]
    ).unwrap();

    /// Entries currently held by the local layer
    pub static ref LOCAL_ENTRIES: IntGauge = register_int_gauge!(
        "tiercache_local_entries",
        "Number of entries held in the local layer"
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a cache operation
pub fn record_cache_op(layer: &str, operation: &str, outcome: &str, duration_secs: f64) {
    CACHE_OPS_TOTAL
        .with_label_values(&[layer, operation, outcome])
        .inc();
    CACHE_OP_DURATION
        .with_label_values(&[layer, operation])
        .observe(duration_secs);
}

/// Update the local occupancy gauge
pub fn set_local_entries(entries: usize) {
    LOCAL_ENTRIES.set(entries as i64);
}
