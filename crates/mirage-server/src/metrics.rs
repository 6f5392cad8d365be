//! Prometheus metrics for mock servers.
//!
//! Tracks served requests per environment and outcome, proxied traffic and
//! template failures.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Served,
    Proxied,
    NotFound,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Served => "served",
            Outcome::Proxied => "proxied",
            Outcome::NotFound => "not_found",
            Outcome::Error => "error",
        }
    }
}

lazy_static! {
    /// Total number of requests answered by mock servers
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mirage_requests_total",
        "Total number of requests answered by mock servers",
        &["environment", "outcome"]
    )
    .unwrap();

    /// Request duration, including configured latency
    pub static ref REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mirage_request_duration_ms",
        "Histogram of request duration in milliseconds",
        &["environment"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Requests forwarded to the proxy host
    pub static ref PROXIED_TOTAL: CounterVec = register_counter_vec!(
        "mirage_proxied_requests_total",
        "Total number of requests forwarded to the proxy host",
        &["environment", "status"]
    )
    .unwrap();

    /// Template rendering failures
    pub static ref TEMPLATE_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "mirage_template_errors_total",
        "Total number of template rendering failures",
        &["environment", "kind"]  // kind: body|header|file
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {e}\n");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(environment: &str, outcome: Outcome, duration_ms: f64) {
    REQUESTS_TOTAL
        .with_label_values(&[environment, outcome.as_str()])
        .inc();
    REQUEST_DURATION_MS
        .with_label_values(&[environment])
        .observe(duration_ms);
}

pub fn record_proxied(environment: &str, status: u16) {
    PROXIED_TOTAL
        .with_label_values(&[environment, &status.to_string()])
        .inc();
}

pub fn record_template_error(environment: &str, kind: &str) {
    TEMPLATE_ERRORS_TOTAL
        .with_label_values(&[environment, kind])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        record_request("metrics-test-env", Outcome::Served, 3.0);
        record_request("metrics-test-env", Outcome::Served, 4.0);
        let value = REQUESTS_TOTAL
            .with_label_values(&["metrics-test-env", "served"])
            .get();
        assert!(value >= 2.0);
    }

    #[test]
    fn test_collect_metrics_contains_families() {
        record_proxied("metrics-test-env", 200);
        record_template_error("metrics-test-env", "body");
        let text = collect_metrics();
        assert!(text.contains("mirage_proxied_requests_total"));
        assert!(text.contains("mirage_template_errors_total"));
    }
}
