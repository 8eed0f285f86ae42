//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the measurement contract used by the operation recorder
//! - Record router metrics through the `metrics` facade
//! - Expose a Prometheus scrape endpoint
//!
//! # Metrics
//! - `router_http_requests_total` (counter): completed operations
//! - `router_http_request_content_length` (histogram): request body bytes
//! - `router_http_request_duration_milliseconds` (histogram): latency
//! - `router_http_response_content_length` (histogram): response body bytes
//! - `router_http_requests_in_flight` (gauge): operations in progress
//!
//! # Design Decisions
//! - Attributes are passed per call; the backend holds no request state
//! - In-flight tracking returns a guard so the decrement cannot be skipped

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "router_http_requests_total";
pub const REQUEST_CONTENT_LENGTH: &str = "router_http_request_content_length";
pub const REQUEST_DURATION: &str = "router_http_request_duration_milliseconds";
pub const RESPONSE_CONTENT_LENGTH: &str = "router_http_response_content_length";
pub const REQUESTS_IN_FLIGHT: &str = "router_http_requests_in_flight";

/// Latency buckets in milliseconds.
const LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Size buckets in bytes.
const SIZE_BUCKETS: &[f64] = &[
    256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0, 5242880.0,
];

/// A metric attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: &'static str,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Releases an in-flight measurement when dropped.
pub struct InFlightGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl InFlightGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard that releases nothing.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Counter and histogram sink used by the operation recorder.
pub trait MetricsBackend: Send + Sync {
    fn measure_in_flight(&self, attributes: &[KeyValue]) -> InFlightGuard;
    fn measure_request_count(&self, attributes: &[KeyValue]);
    fn measure_request_size(&self, content_length: i64, attributes: &[KeyValue]);
    fn measure_latency(&self, started: Instant, attributes: &[KeyValue]);
    fn measure_response_size(&self, size: i64, attributes: &[KeyValue]);
}

/// Backend recording through the global `metrics` recorder.
#[derive(Debug, Clone, Default)]
pub struct PrometheusMetrics {
    service_name: Option<String>,
}

impl PrometheusMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            service_name: (!service_name.is_empty()).then_some(service_name),
        }
    }

    fn labels(&self, attributes: &[KeyValue]) -> Vec<Label> {
        let mut labels: Vec<Label> = attributes
            .iter()
            .map(|kv| Label::new(kv.key, kv.value.clone()))
            .collect();
        if let Some(service) = &self.service_name {
            labels.push(Label::new("service.name", service.clone()));
        }
        labels
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn measure_in_flight(&self, attributes: &[KeyValue]) -> InFlightGuard {
        let labels = self.labels(attributes);
        gauge!(REQUESTS_IN_FLIGHT, labels.clone()).increment(1.0);
        InFlightGuard::new(move || gauge!(REQUESTS_IN_FLIGHT, labels).decrement(1.0))
    }

    fn measure_request_count(&self, attributes: &[KeyValue]) {
        counter!(REQUESTS_TOTAL, self.labels(attributes)).increment(1);
    }

    fn measure_request_size(&self, content_length: i64, attributes: &[KeyValue]) {
        histogram!(REQUEST_CONTENT_LENGTH, self.labels(attributes)).record(content_length as f64);
    }

    fn measure_latency(&self, started: Instant, attributes: &[KeyValue]) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(REQUEST_DURATION, self.labels(attributes)).record(elapsed_ms);
    }

    fn measure_response_size(&self, size: i64, attributes: &[KeyValue]) {
        histogram!(RESPONSE_CONTENT_LENGTH, self.labels(attributes)).record(size as f64);
    }
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS_MS)?
        .set_buckets_for_metric(Matcher::Suffix("content_length".to_string()), SIZE_BUCKETS)?
        .install()?;

    describe_counter!(REQUESTS_TOTAL, "Total number of completed GraphQL operations");
    describe_histogram!(
        REQUEST_CONTENT_LENGTH,
        metrics::Unit::Bytes,
        "Size of client request bodies"
    );
    describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Milliseconds,
        "End-to-end operation latency"
    );
    describe_histogram!(
        RESPONSE_CONTENT_LENGTH,
        metrics::Unit::Bytes,
        "Size of client response bodies"
    );
    describe_gauge!(REQUESTS_IN_FLIGHT, "Operations currently being served");
    describe_counter!(
        crate::analytics::exporter::DROPPED_TOTAL,
        "Schema usage records dropped before delivery"
    );

    tracing::info!(address = %addr, "Prometheus metrics endpoint listening");
    Ok(())
}
