//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check subgraph names and routing URLs
//! - Compile header rules so broken patterns are rejected before use
//! - Enforce minimum values for retries, timeouts and body size
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before a config is accepted, at startup and on every reload

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::headers::HeaderTransformer;

pub const MIN_REQUEST_BODY_SIZE: u64 = 1_000_000;
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
pub const MIN_RETRY_MAX_DURATION: Duration = Duration::from_secs(1);
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listen_addr `{0}` must be host:port")]
    InvalidListenAddr(String),

    #[error("graphql_path `{0}` must start with `/`")]
    InvalidGraphqlPath(String),

    #[error("log_level `{0}` is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("at least one subgraph must be configured")]
    NoSubgraphs,

    #[error("subgraph #{0} has an empty name")]
    EmptySubgraphName(usize),

    #[error("subgraph `{0}` is defined more than once")]
    DuplicateSubgraph(String),

    #[error("subgraph `{name}` has invalid routing URL `{url}`")]
    InvalidRoutingUrl { name: String, url: String },

    #[error("override_routing_url references unknown subgraph `{0}`")]
    UnknownOverride(String),

    #[error("{0}")]
    HeaderRule(String),

    #[error("{field} must be at least {min}, got {actual}")]
    BelowMinimum {
        field: &'static str,
        min: String,
        actual: String,
    },

    #[error("telemetry.metrics.prometheus.listen_addr `{0}` is not a socket address")]
    InvalidMetricsAddr(String),

    #[error("graphql_metrics.collector_endpoint `{0}` is not a valid URL")]
    InvalidCollectorEndpoint(String),

    #[error("graphql_metrics.{0} must be greater than zero")]
    ZeroExporterSetting(&'static str),
}

fn is_host_port(addr: &str) -> bool {
    addr.rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

fn is_http_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}

fn at_least(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    actual: Duration,
    min: Duration,
) {
    if actual < min {
        errors.push(ValidationError::BelowMinimum {
            field,
            min: format!("{:?}", min),
            actual: format!("{:?}", actual),
        });
    }
}

/// Validate `config`, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_host_port(&config.listen_addr) {
        errors.push(ValidationError::InvalidListenAddr(config.listen_addr.clone()));
    }
    if !config.graphql_path.starts_with('/') {
        errors.push(ValidationError::InvalidGraphqlPath(config.graphql_path.clone()));
    }
    if !LOG_LEVELS.contains(&config.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel(config.log_level.clone()));
    }

    // Subgraphs
    if config.subgraphs.is_empty() {
        errors.push(ValidationError::NoSubgraphs);
    }
    let mut names = HashSet::new();
    for (index, subgraph) in config.subgraphs.iter().enumerate() {
        if subgraph.name.is_empty() {
            errors.push(ValidationError::EmptySubgraphName(index));
            continue;
        }
        if !names.insert(subgraph.name.as_str()) {
            errors.push(ValidationError::DuplicateSubgraph(subgraph.name.clone()));
        }
        let url = config.routing_url(subgraph);
        if !is_http_url(url) {
            errors.push(ValidationError::InvalidRoutingUrl {
                name: subgraph.name.clone(),
                url: url.to_string(),
            });
        }
    }
    for name in config.override_routing_url.subgraphs.keys() {
        if !names.contains(name.as_str()) {
            errors.push(ValidationError::UnknownOverride(name.clone()));
        }
    }

    if let Err(e) = HeaderTransformer::new(&config.headers) {
        errors.push(ValidationError::HeaderRule(e.to_string()));
    }

    // Traffic shaping
    let all = &config.traffic_shaping.all;
    if all.retry.enabled {
        if all.retry.max_attempts < 1 {
            errors.push(ValidationError::BelowMinimum {
                field: "traffic_shaping.all.retry.max_attempts",
                min: "1".to_string(),
                actual: all.retry.max_attempts.to_string(),
            });
        }
        at_least(
            &mut errors,
            "traffic_shaping.all.retry.max_duration",
            all.retry.max_duration,
            MIN_RETRY_MAX_DURATION,
        );
        at_least(
            &mut errors,
            "traffic_shaping.all.retry.interval",
            all.retry.interval,
            MIN_RETRY_INTERVAL,
        );
    }
    at_least(
        &mut errors,
        "traffic_shaping.all.request_timeout",
        all.request_timeout,
        MIN_REQUEST_TIMEOUT,
    );

    let body_size = config.traffic_shaping.router.max_request_body_size;
    if body_size.bytes() < MIN_REQUEST_BODY_SIZE {
        errors.push(ValidationError::BelowMinimum {
            field: "traffic_shaping.router.max_request_body_size",
            min: MIN_REQUEST_BODY_SIZE.to_string(),
            actual: body_size.bytes().to_string(),
        });
    }

    // Telemetry
    let prometheus = &config.telemetry.metrics.prometheus;
    if prometheus.enabled && prometheus.listen_addr.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddr(prometheus.listen_addr.clone()));
    }

    let metrics = &config.graphql_metrics;
    if metrics.enabled {
        if !is_http_url(&metrics.collector_endpoint) {
            errors.push(ValidationError::InvalidCollectorEndpoint(
                metrics.collector_endpoint.clone(),
            ));
        }
        if metrics.queue_size == 0 {
            errors.push(ValidationError::ZeroExporterSetting("queue_size"));
        }
        if metrics.batch_size == 0 {
            errors.push(ValidationError::ZeroExporterSetting("batch_size"));
        }
        if metrics.flush_interval.is_zero() {
            errors.push(ValidationError::ZeroExporterSetting("flush_interval"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RequestHeaderRule, SubgraphConfig};
    use crate::config::units::ByteSize;

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.subgraphs.push(SubgraphConfig {
            name: "accounts".into(),
            id: None,
            routing_url: "http://localhost:4001/graphql".into(),
            root_fields: vec![],
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.listen_addr = "nowhere".into();
        config.graphql_path = "graphql".into();
        config.log_level = "loud".into();
        config.subgraphs.push(config.subgraphs[0].clone());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidListenAddr("nowhere".into()),
                ValidationError::InvalidGraphqlPath("graphql".into()),
                ValidationError::InvalidLogLevel("loud".into()),
                ValidationError::DuplicateSubgraph("accounts".into()),
            ]
        );
    }

    #[test]
    fn test_routing_url_override_is_validated() {
        let mut config = valid();
        config
            .override_routing_url
            .subgraphs
            .insert("accounts".into(), "not a url".into());
        config
            .override_routing_url
            .subgraphs
            .insert("ghost".into(), "http://ghost.local".into());

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidRoutingUrl {
            name: "accounts".into(),
            url: "not a url".into(),
        }));
        assert!(errors.contains(&ValidationError::UnknownOverride("ghost".into())));
    }

    #[test]
    fn test_invalid_header_rule() {
        let mut config = valid();
        config.headers.all.request.push(RequestHeaderRule::matching("["));

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(&errors[0], ValidationError::HeaderRule(msg) if msg.contains("`[`")));
    }

    #[test]
    fn test_traffic_shaping_minimums() {
        let mut config = valid();
        config.traffic_shaping.all.retry.interval = Duration::from_millis(10);
        config.traffic_shaping.all.retry.max_duration = Duration::from_millis(500);
        config.traffic_shaping.all.request_timeout = Duration::ZERO;
        config.traffic_shaping.router.max_request_body_size = ByteSize(1024);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::BelowMinimum { .. })));
    }

    #[test]
    fn test_disabled_retry_skips_retry_minimums() {
        let mut config = valid();
        config.traffic_shaping.all.retry.enabled = false;
        config.traffic_shaping.all.retry.interval = Duration::ZERO;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_exporter_settings() {
        let mut config = valid();
        config.graphql_metrics.batch_size = 0;
        config.graphql_metrics.collector_endpoint = "collector".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);

        config.graphql_metrics.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
