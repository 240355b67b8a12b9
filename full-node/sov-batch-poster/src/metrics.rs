use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

pub static BATCH_POSTER_POSTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        // metric name
        "batch_poster_posts",
        // metric description
        "Batches posted to the inbox by writer kind",
        // metric labels (dimensions)
        &["writer"]
    )
    .unwrap()
});

pub static BATCH_POSTER_FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        // metric name
        "batch_poster_fallbacks",
        // metric description
        "Transitions away from a writer by the kind of writer left",
        // metric labels (dimensions)
        &["from"]
    )
    .unwrap()
});

pub static BATCH_POSTER_RESIZES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        // metric name
        "batch_poster_resizes",
        // metric description
        "Batches rebuilt smaller after a writer rejected their size"
    )
    .unwrap()
});

pub static BATCH_POSTER_DEFERRALS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        // metric name
        "batch_poster_deferrals",
        // metric description
        "Cycles that ended without posting because on-chain fallback is disabled"
    )
    .unwrap()
});

pub static BATCH_POSTER_PENDING_MESSAGES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        // metric name
        "batch_poster_pending_messages",
        // metric description
        "Messages waiting in the queue"
    )
    .unwrap()
});
