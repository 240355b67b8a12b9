use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

pub static BLOB_STORE_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        // metric name
        "blob_store_operations",
        // metric description
        "Blob store operations by backend, operation and outcome",
        // metric labels (dimensions)
        &["backend", "operation", "outcome"]
    )
    .unwrap()
});

pub static BLOB_STORE_SWEPT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        // metric name
        "blob_store_swept_blobs",
        // metric description
        "Expired blobs removed by the retention sweeper",
        // metric labels (dimensions)
        &["backend"]
    )
    .unwrap()
});

pub(crate) fn record_operation(backend: &str, operation: &str, outcome: &str) {
    BLOB_STORE_OPERATIONS
        .with_label_values(&[backend, operation, outcome])
        .inc();
}
