//! Prometheus metrics for lowerbound-proxy.
//!
//! Tracks admission queue activity (admissions, releases, promotions, wait
//! time, depth) and proxied exchanges.
use crate::admission::{Priority, Release};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_gauge, CounterVec, Encoder, GaugeVec, HistogramVec, IntCounter, IntGauge,
    TextEncoder,
};
use std::time::Duration;

lazy_static! {
    /// Tickets admitted, by submitted priority
    pub static ref ADMISSIONS_TOTAL: CounterVec = register_counter_vec!(
        "lowerbound_admissions_total",
        "Total number of responses submitted to the admission queue",
        &["priority"]
    )
    .unwrap();

    /// Tickets released, by the tier they left and how
    pub static ref RELEASES_TOTAL: CounterVec = register_counter_vec!(
        "lowerbound_releases_total",
        "Total number of admission tickets released",
        &["tier", "outcome"]  // outcome: dispatched|drained|timed_out|closed
    )
    .unwrap();

    /// Low tickets moved to the High tier by the schedule cursor
    pub static ref PROMOTIONS_TOTAL: IntCounter = register_int_counter!(
        "lowerbound_promotions_total",
        "Total number of low-priority tickets promoted to the high tier"
    )
    .unwrap();

    /// Time spent queued before release
    pub static ref ADMISSION_WAIT_MS: HistogramVec = register_histogram_vec!(
        "lowerbound_admission_wait_ms",
        "Histogram of time a response was held by the admission queue in milliseconds",
        &["tier", "outcome"],
        vec![0.5, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Tickets currently queued per tier
    pub static ref QUEUE_DEPTH: GaugeVec = register_gauge_vec!(
        "lowerbound_queue_depth",
        "Number of tickets currently waiting in each admission tier",
        &["tier"]
    )
    .unwrap();

    /// Furthest schedule position observed
    pub static ref SCHEDULE_CURSOR: IntGauge = register_int_gauge!(
        "lowerbound_schedule_cursor",
        "Furthest request-order position reached by any observed request"
    )
    .unwrap();

    /// Total number of proxied exchanges
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "lowerbound_requests_total",
        "Total number of requests processed by the proxy",
        &["method", "status"]
    )
    .unwrap();

    /// Upstream request duration (without admission delay)
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "lowerbound_upstream_request_duration_ms",
        "Duration of upstream requests until response headers arrive",
        &["method", "status"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Proxy request duration including admission delay
    pub static ref PROXY_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "lowerbound_proxy_request_duration_ms",
        "Total request duration including upstream fetch and admission delay",
        &["method", "scheduled"],  // scheduled: true|false
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_admission(priority: Priority) {
    ADMISSIONS_TOTAL
        .with_label_values(&[priority.as_str()])
        .inc();
}

pub fn record_release(tier: Priority, outcome: Release, waited: Duration) {
    RELEASES_TOTAL
        .with_label_values(&[tier.as_str(), outcome.as_str()])
        .inc();
    ADMISSION_WAIT_MS
        .with_label_values(&[tier.as_str(), outcome.as_str()])
        .observe(waited.as_secs_f64() * 1000.0);
}

pub fn record_promotions(count: usize) {
    PROMOTIONS_TOTAL.inc_by(count as u64);
}

pub fn set_queue_depth(high: usize, low: usize) {
    QUEUE_DEPTH
        .with_label_values(&[Priority::High.as_str()])
        .set(high as f64);
    QUEUE_DEPTH
        .with_label_values(&[Priority::Low.as_str()])
        .set(low as f64);
}

pub fn set_schedule_cursor(cursor: usize) {
    SCHEDULE_CURSOR.set(cursor as i64);
}

pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_upstream_duration(method: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, &status.to_string()])
        .observe(duration_ms);
}

pub fn record_proxy_duration(method: &str, duration_ms: f64, scheduled: bool) {
    let scheduled = if scheduled { "true" } else { "false" };
    PROXY_REQUEST_DURATION_MS
        .with_label_values(&[method, scheduled])
        .observe(duration_ms);
}
