use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec,
};

pub static AGGREGATOR_STORES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        // metric name
        "anytrust_aggregator_stores",
        // metric description
        "Quorum stores by outcome",
        // metric labels (dimensions)
        &["outcome"]
    )
    .unwrap()
});

pub static AGGREGATOR_BACKEND_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        // metric name
        "anytrust_aggregator_backend_failures",
        // metric description
        "Backend stores that did not yield a valid signature",
        // metric labels (dimensions)
        &["backend"]
    )
    .unwrap()
});

pub static AGGREGATOR_STORE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        // metric name
        "anytrust_aggregator_store_duration_seconds",
        // metric description
        "Time from fan-out until the quorum was decided"
    )
    .unwrap()
});
