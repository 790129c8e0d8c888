use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Histogram, register_counter, register_counter_vec, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of generate requests").unwrap();
    pub static ref RATE_LIMITED: CounterVec = register_counter_vec!(
        "gateway_rate_limited_total",
        "Requests rejected by quota, by tripped limit",
        &["reason"]
    )
    .unwrap();
    pub static ref STORE_FAILURES: Counter = register_counter!(
        "gateway_store_failures_total",
        "Counter store operations that failed"
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES: Counter = register_counter!(
        "gateway_upstream_failures_total",
        "Upstream calls that failed to complete"
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "gateway_upstream_latency_seconds",
        "Upstream call latency in seconds"
    )
    .unwrap();
}
