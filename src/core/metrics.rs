// src/core/metrics.rs

//! Defines and registers Prometheus metrics for service monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, HistogramVec, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_histogram_vec,
};

lazy_static! {
    // --- Ingestion ---
    /// The total number of SSE events accepted and routed, labeled by event type.
    pub static ref SSE_EVENTS_TOTAL: CounterVec =
        register_counter_vec!("wanderer_sync_sse_events_total", "Total SSE events routed, labeled by event type.", &["event_type"]).unwrap();
    /// The total number of SSE events discarded by validation.
    pub static ref SSE_EVENTS_DISCARDED_TOTAL: Counter =
        register_counter!("wanderer_sync_sse_events_discarded_total", "Total SSE events dropped by validation.").unwrap();
    /// The total number of SSE reconnect attempts.
    pub static ref SSE_RECONNECTS_TOTAL: Counter =
        register_counter!("wanderer_sync_sse_reconnects_total", "Total SSE reconnect attempts.").unwrap();

    // --- HTTP client ---
    /// Outbound HTTP request durations, labeled by service and outcome.
    pub static ref HTTP_REQUEST_SECONDS: HistogramVec =
        register_histogram_vec!("wanderer_sync_http_request_seconds", "Latency of outbound HTTP requests.", &["service", "outcome"]).unwrap();
    /// Requests rejected locally because a rate-limit bucket was full.
    pub static ref HTTP_RATE_LIMITED_TOTAL: CounterVec =
        register_counter_vec!("wanderer_sync_http_rate_limited_total", "Requests rejected by the local rate limiter, labeled by bucket.", &["bucket"]).unwrap();

    // --- Cache ---
    /// The total number of successful cache lookups.
    pub static ref CACHE_HITS_TOTAL: Counter =
        register_counter!("wanderer_sync_cache_hits_total", "Total number of cache hits.").unwrap();
    /// The total number of failed cache lookups.
    pub static ref CACHE_MISSES_TOTAL: Counter =
        register_counter!("wanderer_sync_cache_misses_total", "Total number of cache misses.").unwrap();
    /// The total number of cache keys evicted due to the key-count limit.
    pub static ref CACHE_EVICTIONS_TOTAL: Counter =
        register_counter!("wanderer_sync_cache_evictions_total", "Total number of cache keys evicted.").unwrap();
    /// The total number of keys expired by the active purger.
    pub static ref CACHE_EXPIRED_TOTAL: Counter =
        register_counter!("wanderer_sync_cache_expired_total", "Total number of keys expired proactively.").unwrap();
    /// The number of keys currently held by the cache.
    pub static ref CACHE_KEYS: Gauge =
        register_gauge!("wanderer_sync_cache_keys", "Number of keys currently held by the cache.").unwrap();

    // --- Topology ---
    /// The number of border systems found by the most recent topology pass.
    pub static ref BORDER_SYSTEMS: Gauge =
        register_gauge!("wanderer_sync_border_systems", "Border systems found by the latest topology pass.").unwrap();
    /// The total number of completed topology passes.
    pub static ref TOPOLOGY_PASSES_TOTAL: Counter =
        register_counter!("wanderer_sync_topology_passes_total", "Total completed topology passes.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
