use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};

// Prometheus metrics (default registry)
pub static STORAGE_OPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sahaay_storage_operations_total",
        "Total storage operations by operation and outcome",
        &["operation", "outcome"]
    )
    .expect("register storage_operations_total")
});

pub static STORAGE_RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sahaay_storage_retries_total",
        "Total retry attempts against the storage backend",
        &["operation"]
    )
    .expect("register storage_retries_total")
});

pub static STORAGE_EXHAUSTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sahaay_storage_exhausted_total",
        "Storage operations that failed after every attempt",
        &["operation"]
    )
    .expect("register storage_exhausted_total")
});

pub static STORAGE_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sahaay_storage_operation_duration_seconds",
        "Storage operation duration in seconds, retries included",
        &["operation"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 20.0]
    )
    .expect("register storage_operation_duration")
});

/// Render every registered metric in the text exposition format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# metrics encode error: {e}\n");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
