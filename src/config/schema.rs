//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::units::{self, ByteSize};

/// Root configuration for the federation gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Version of the router configuration, reported as the schema version
    /// of exported usage records.
    pub version: String,

    /// Bind address of the GraphQL endpoint (e.g., "localhost:3002").
    pub listen_addr: String,

    /// Path the GraphQL endpoint is served on.
    pub graphql_path: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human-readable format.
    pub json_log: bool,

    /// Federated graph identity.
    pub graph: GraphConfig,

    /// Subgraphs the gateway fans out to.
    pub subgraphs: Vec<SubgraphConfig>,

    /// Routing URL overrides keyed by subgraph name.
    pub override_routing_url: OverrideRoutingUrlConfig,

    /// Header propagation rules.
    pub headers: HeaderRules,

    /// Timeouts, retries and request size limits.
    pub traffic_shaping: TrafficShapingRules,

    /// Metrics settings.
    pub telemetry: TelemetryConfig,

    /// Schema usage export settings.
    pub graphql_metrics: GraphqlMetricsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            listen_addr: "localhost:3002".to_string(),
            graphql_path: "/graphql".to_string(),
            log_level: "info".to_string(),
            json_log: true,
            graph: GraphConfig::default(),
            subgraphs: Vec::new(),
            override_routing_url: OverrideRoutingUrlConfig::default(),
            headers: HeaderRules::default(),
            traffic_shaping: TrafficShapingRules::default(),
            telemetry: TelemetryConfig::default(),
            graphql_metrics: GraphqlMetricsConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Routing URL of a subgraph after applying `override_routing_url`.
    pub fn routing_url<'a>(&'a self, subgraph: &'a SubgraphConfig) -> &'a str {
        self.override_routing_url
            .subgraphs
            .get(&subgraph.name)
            .map(String::as_str)
            .unwrap_or(&subgraph.routing_url)
    }
}

/// Federated graph identity.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Name of the federated graph.
    pub name: String,

    /// API token, used to authenticate against the usage collector.
    pub token: String,
}

/// A subgraph reachable over HTTP.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubgraphConfig {
    /// Subgraph name; header rules are looked up by this name.
    pub name: String,

    /// Stable identifier reported in usage records. Defaults to the name.
    #[serde(default)]
    pub id: Option<String>,

    /// URL GraphQL requests are posted to.
    pub routing_url: String,

    /// Root fields owned by this subgraph.
    #[serde(default)]
    pub root_fields: Vec<String>,
}

impl SubgraphConfig {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OverrideRoutingUrlConfig {
    pub subgraphs: HashMap<String, String>,
}

/// Header propagation rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderRules {
    /// Rules applied to requests for every subgraph.
    pub all: GlobalHeaderRule,

    /// Rules applied on top of `all` for the named subgraph only.
    pub subgraphs: HashMap<String, GlobalHeaderRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalHeaderRule {
    /// Ordered rules applied to outbound subgraph requests.
    pub request: Vec<RequestHeaderRule>,
}

/// Operation performed by a header rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderOperation {
    #[default]
    Propagate,
}

/// A single header rule. Exactly one of `matching` and `named` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequestHeaderRule {
    #[serde(default)]
    pub op: HeaderOperation,

    /// Regular expression tested against header names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<String>,

    /// Exact header name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named: Option<String>,

    /// Value used when the client did not send the header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl RequestHeaderRule {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            named: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn matching(pattern: impl Into<String>) -> Self {
        Self {
            matching: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Traffic shaping rules.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TrafficShapingRules {
    /// Applies to every subgraph request.
    pub all: SubgraphTrafficRules,

    /// Applies to requests from clients to the gateway.
    pub router: RouterTrafficConfig,
}

/// Transport settings for subgraph requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubgraphTrafficRules {
    pub retry: RetryConfig,

    #[serde(with = "units::duration")]
    pub request_timeout: Duration,

    #[serde(with = "units::duration")]
    pub dial_timeout: Duration,

    #[serde(with = "units::duration")]
    pub response_header_timeout: Duration,

    #[serde(with = "units::duration")]
    pub expect_continue_timeout: Duration,

    #[serde(with = "units::duration")]
    pub tls_handshake_timeout: Duration,

    #[serde(with = "units::duration")]
    pub keep_alive_idle_timeout: Duration,

    #[serde(with = "units::duration")]
    pub keep_alive_probe_interval: Duration,
}

impl Default for SubgraphTrafficRules {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(60),
            dial_timeout: Duration::from_secs(30),
            response_header_timeout: Duration::ZERO,
            expect_continue_timeout: Duration::ZERO,
            tls_handshake_timeout: Duration::from_secs(10),
            keep_alive_idle_timeout: Duration::ZERO,
            keep_alive_probe_interval: Duration::from_secs(30),
        }
    }
}

/// Retry algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAlgorithm {
    #[default]
    BackoffJitter,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    pub algorithm: RetryAlgorithm,

    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Upper bound on the total time spent retrying.
    #[serde(with = "units::duration")]
    pub max_duration: Duration,

    /// Base delay between attempts.
    #[serde(with = "units::duration")]
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: RetryAlgorithm::BackoffJitter,
            max_attempts: 5,
            max_duration: Duration::from_secs(10),
            interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterTrafficConfig {
    /// Maximum size of a client request body.
    pub max_request_body_size: ByteSize,
}

impl Default for RouterTrafficConfig {
    fn default() -> Self {
        Self {
            max_request_body_size: ByteSize(5_000_000),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "federation-gateway".to_string(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Enable the Prometheus scrape endpoint.
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub listen_addr: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:8088".to_string(),
        }
    }
}

/// Schema usage export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphqlMetricsConfig {
    /// Enable schema usage export. Requires `graph.token`.
    pub enabled: bool,

    /// Base URL of the usage collector.
    pub collector_endpoint: String,

    /// Capacity of the export queue; records beyond it are dropped.
    pub queue_size: usize,

    /// Maximum number of records per delivery.
    pub batch_size: usize,

    /// Maximum time a record waits before its batch is delivered.
    #[serde(with = "units::duration")]
    pub flush_interval: Duration,
}

impl Default for GraphqlMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collector_endpoint: "https://cosmo-metrics.wundergraph.com".to_string(),
            queue_size: 10_240,
            batch_size: 1_024,
            flush_interval: Duration::from_secs(10),
        }
    }
}
