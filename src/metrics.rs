//! Prometheus metrics for correlation and HTTP latency.
//!
//! This module provides metrics for:
//! - Correlation latency and outcomes
//! - Records returned and skipped during decoding
//! - HTTP request latency

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Correlation latency metric name.
pub const METRIC_CORRELATE_LATENCY: &str = "correlate_latency_ms";
/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Correlation requests counter metric name.
pub const METRIC_CORRELATE_REQUESTS: &str = "correlate_requests_total";
/// Correlation failures counter metric name.
pub const METRIC_CORRELATE_FAILURES: &str = "correlate_failures_total";
/// Returned traffic records counter metric name.
pub const METRIC_RECORDS_RETURNED: &str = "traffic_records_returned_total";
/// Skipped (undecodable) records counter metric name.
pub const METRIC_RECORDS_SKIPPED: &str = "traffic_records_skipped_total";

/// Install the Prometheus recorder and describe every metric.
///
/// Call once at startup; the handle renders `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Initialize all metric descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_CORRELATE_LATENCY,
        "Traffic correlation latency in milliseconds"
    );
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );

    describe_counter!(
        METRIC_CORRELATE_REQUESTS,
        "Total number of correlation requests"
    );
    describe_counter!(
        METRIC_CORRELATE_FAILURES,
        "Total number of correlation requests that failed"
    );
    describe_counter!(
        METRIC_RECORDS_RETURNED,
        "Total number of enriched traffic records returned"
    );
    describe_counter!(
        METRIC_RECORDS_SKIPPED,
        "Total number of documents skipped because they could not be decoded"
    );

    debug!("Metrics initialized");
}

/// Increment correlation requests counter.
pub fn inc_correlate_requests() {
    counter!(METRIC_CORRELATE_REQUESTS).increment(1);
}

/// Increment correlation failures counter.
pub fn inc_correlate_failures() {
    counter!(METRIC_CORRELATE_FAILURES).increment(1);
}

/// Add to the returned records counter.
pub fn add_records_returned(count: usize) {
    counter!(METRIC_RECORDS_RETURNED).increment(count as u64);
}

/// Increment skipped records counter for a collection kind.
pub fn inc_records_skipped(kind: &'static str) {
    counter!(METRIC_RECORDS_SKIPPED, "kind" => kind).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
    endpoint: Option<&'static str>,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
            endpoint: None,
        }
    }

    /// Label the recorded latency with an HTTP endpoint.
    pub fn with_endpoint(mut self, endpoint: &'static str) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.elapsed_ms();
        match self.endpoint {
            Some(endpoint) => histogram!(self.metric_name, "endpoint" => endpoint).record(latency_ms),
            None => histogram!(self.metric_name).record(latency_ms),
        }
    }
}

/// Create a latency timer for a correlation.
pub fn timer_correlate() -> LatencyTimer {
    LatencyTimer::new(METRIC_CORRELATE_LATENCY)
}

/// Create a latency timer for an HTTP request to `endpoint`.
pub fn timer_http(endpoint: &'static str) -> LatencyTimer {
    LatencyTimer::new(METRIC_HTTP_REQUEST_LATENCY).with_endpoint(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        init_metrics();
        inc_correlate_requests();
        add_records_returned(3);
        inc_records_skipped("traffic");
        drop(timer_http("/TrafficService"));
    }

    #[test]
    fn http_timer_records_labelled_latency() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            drop(timer_http("/TrafficService"));
        });

        let rendered = handle.render();
        assert!(rendered.contains(METRIC_HTTP_REQUEST_LATENCY));
        assert!(rendered.contains(r#"endpoint="/TrafficService""#));
    }
}
