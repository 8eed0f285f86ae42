//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use federation_gateway::analytics::{SchemaUsageInfo, UsageSink};
use federation_gateway::config::{GatewayConfig, SubgraphConfig};
use federation_gateway::observability::{InFlightGuard, KeyValue, MetricsBackend, Telemetry};
use federation_gateway::{GatewayServer, Shutdown};

/// A subgraph that answers every request with the headers it received.
pub struct MockSubgraph {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<HeaderMap>>>,
}

impl MockSubgraph {
    pub fn url(&self) -> String {
        format!("http://{}/graphql", self.addr)
    }

    /// Headers of every request received so far.
    pub fn received(&self) -> Vec<HeaderMap> {
        self.received.lock().unwrap().clone()
    }

    pub fn last_headers(&self) -> HeaderMap {
        self.received().pop().expect("subgraph received no request")
    }
}

#[derive(Clone)]
struct MockState {
    field: &'static str,
    delay: Duration,
    received: Arc<Mutex<Vec<HeaderMap>>>,
}

async fn echo_headers(State(state): State<MockState>, headers: HeaderMap) -> Json<Value> {
    let echoed: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    state.received.lock().unwrap().push(headers);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let mut data = Map::new();
    data.insert(state.field.to_string(), Value::Object(echoed));
    Json(json!({ "data": data }))
}

/// Start a subgraph resolving the root field `field` on a random port.
pub async fn start_mock_subgraph(field: &'static str) -> MockSubgraph {
    start_slow_mock_subgraph(field, Duration::ZERO).await
}

/// Like `start_mock_subgraph`, but every response waits `delay`.
pub async fn start_slow_mock_subgraph(field: &'static str, delay: Duration) -> MockSubgraph {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route("/graphql", post(echo_headers))
        .with_state(MockState {
            field,
            delay,
            received: received.clone(),
        });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockSubgraph { addr, received }
}

/// Minimal valid configuration for the given subgraphs, with Prometheus and
/// usage export disabled.
pub fn gateway_config(subgraphs: &[(&str, &MockSubgraph, &[&str])]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.version = "test-config".to_string();
    config.listen_addr = "127.0.0.1:0".to_string();
    config.json_log = false;
    config.telemetry.metrics.prometheus.enabled = false;
    config.graphql_metrics.enabled = false;
    config.subgraphs = subgraphs
        .iter()
        .map(|(name, mock, fields)| SubgraphConfig {
            name: name.to_string(),
            id: Some(format!("{}-id", name)),
            routing_url: mock.url(),
            root_fields: fields.iter().map(|f| f.to_string()).collect(),
        })
        .collect();
    config
}

pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<GatewayConfig>,
    pub handle: tokio::task::JoinHandle<()>,
}

impl RunningGateway {
    pub fn graphql_url(&self) -> String {
        format!("http://{}/graphql", self.addr)
    }
}

pub async fn start_gateway(config: GatewayConfig, telemetry: Telemetry) -> RunningGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (updates, rx) = mpsc::unbounded_channel();

    let server = GatewayServer::new(config, telemetry).unwrap();
    let shutdown_rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, rx, shutdown_rx).await.unwrap();
    });

    RunningGateway {
        addr,
        shutdown,
        updates,
        handle,
    }
}

/// Post a GraphQL query with extra headers.
pub async fn post_query(
    client: &reqwest::Client,
    url: &str,
    query: &str,
    headers: &[(&str, &str)],
) -> reqwest::Response {
    let mut request = client.post(url).json(&json!({ "query": query }));
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request.send().await.unwrap()
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// One emitted measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    InFlight(i64),
    RequestCount(Vec<KeyValue>),
    RequestSize(i64),
    Latency,
    ResponseSize(i64),
}

/// Metrics backend recording every call.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    measurements: Arc<Mutex<Vec<Measurement>>>,
}

impl RecordingBackend {
    pub fn measurements(&self) -> Vec<Measurement> {
        self.measurements.lock().unwrap().clone()
    }

    fn push(&self, measurement: Measurement) {
        self.measurements.lock().unwrap().push(measurement);
    }
}

impl MetricsBackend for RecordingBackend {
    fn measure_in_flight(&self, _attributes: &[KeyValue]) -> InFlightGuard {
        self.push(Measurement::InFlight(1));
        let measurements = self.measurements.clone();
        InFlightGuard::new(move || {
            measurements.lock().unwrap().push(Measurement::InFlight(-1));
        })
    }

    fn measure_request_count(&self, attributes: &[KeyValue]) {
        self.push(Measurement::RequestCount(attributes.to_vec()));
    }

    fn measure_request_size(&self, content_length: i64, _attributes: &[KeyValue]) {
        self.push(Measurement::RequestSize(content_length));
    }

    fn measure_latency(&self, _started: Instant, _attributes: &[KeyValue]) {
        self.push(Measurement::Latency);
    }

    fn measure_response_size(&self, size: i64, _attributes: &[KeyValue]) {
        self.push(Measurement::ResponseSize(size));
    }
}

/// Usage sink keeping every record.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<SchemaUsageInfo>>,
}

impl UsageSink for RecordingSink {
    fn record(&self, info: SchemaUsageInfo) {
        self.records.lock().unwrap().push(info);
    }
}
