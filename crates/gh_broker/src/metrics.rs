use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};

pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_broker_requests_total",
        "Requests by token and status class",
        &["token", "status"]
    )
    .expect("requests total")
});

pub static RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_broker_retries_total",
        "Retries by reason",
        &["reason"]
    )
    .expect("retries")
});

pub static SLEEP_SECONDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_broker_sleep_seconds_total",
        "Total sleep seconds by reason",
        &["reason"]
    )
    .expect("sleep seconds")
});

pub static RATE_REMAINING: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "gh_broker_rate_remaining",
        "Core rate limit remaining per token",
        &["token"]
    )
    .expect("rate remaining")
});

pub static CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("gh_broker_cache_hits_total", "Responses served from the ETag cache")
        .expect("cache hits")
});

pub static CACHE_MISSES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gh_broker_cache_misses_total",
        "Successful GETs fetched with a fresh body"
    )
    .expect("cache misses")
});

pub static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!("gh_broker_latency_seconds", "GitHub request latency")
        .expect("latency")
});
