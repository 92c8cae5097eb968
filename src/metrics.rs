//! Array call metrics
//!
//! Registered once into a crate-private registry; the binary exposes them
//! on `/metrics`.

use crate::error::ErrorKind;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;
use std::time::Duration;

struct ApiMetrics {
    registry: Registry,
    calls: IntCounterVec,
    errors: IntCounterVec,
    duration: HistogramVec,
    panics: IntCounter,
}

static METRICS: OnceLock<ApiMetrics> = OnceLock::new();

fn metrics() -> &'static ApiMetrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let calls = IntCounterVec::new(
            Opts::new("ontap_api_calls_total", "Array API calls issued by the facade"),
            &["operation", "protocol"],
        )
        .expect("valid metric definition");
        let errors = IntCounterVec::new(
            Opts::new("ontap_api_errors_total", "Classified array API errors"),
            &["operation", "kind"],
        )
        .expect("valid metric definition");
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "ontap_api_call_duration_seconds",
                "Duration of facade calls including pagination and job polling",
            ),
            &["operation"],
        )
        .expect("valid metric definition");
        let panics = IntCounter::new(
            "ontap_api_panics_total",
            "Faults caught by the facade guard",
        )
        .expect("valid metric definition");

        // Names are unique within this private registry
        let _ = registry.register(Box::new(calls.clone()));
        let _ = registry.register(Box::new(errors.clone()));
        let _ = registry.register(Box::new(duration.clone()));
        let _ = registry.register(Box::new(panics.clone()));

        ApiMetrics {
            registry,
            calls,
            errors,
            duration,
            panics,
        }
    })
}

/// Record one facade call
pub fn record_call(operation: &str, protocol: &str, elapsed: Duration) {
    let m = metrics();
    m.calls.with_label_values(&[operation, protocol]).inc();
    m.duration
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}

/// Record one classified error
pub fn record_error(operation: &str, kind: ErrorKind) {
    metrics()
        .errors
        .with_label_values(&[operation, &kind.to_string()])
        .inc();
}

/// Record a fault caught by the facade guard
pub fn record_panic() {
    metrics().panics.inc();
}

/// Number of classified errors recorded for an operation and kind
pub fn error_count(operation: &str, kind: ErrorKind) -> u64 {
    metrics()
        .errors
        .with_label_values(&[operation, &kind.to_string()])
        .get()
}

/// Render all metrics in the Prometheus text format
pub fn gather() -> (String, Vec<u8>) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metrics().registry.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    (encoder.format_type().to_string(), buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counter_increments() {
        let before = error_count("MetricsTestOp", ErrorKind::Transient);
        record_error("MetricsTestOp", ErrorKind::Transient);
        assert_eq!(error_count("MetricsTestOp", ErrorKind::Transient), before + 1);
    }

    #[test]
    fn test_gather_contains_families() {
        record_call("MetricsGatherOp", "zapi", Duration::from_millis(3));
        let (content_type, body) = gather();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("ontap_api_calls_total"));
    }
}
