//! Subgraph transport settings.
//!
//! # Responsibilities
//! - Translate `traffic_shaping.all` into an HTTP client
//! - Give every outbound call a connect deadline and a total deadline
//!
//! # Design Decisions
//! - A zero duration means "unset" and leaves the client default in place
//! - `response_header_timeout` maps to the client read timeout; the
//!   expect-continue and TLS handshake timeouts have no separate knob and
//!   are covered by the connect and request deadlines

use std::time::Duration;

use crate::config::schema::SubgraphTrafficRules;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub request_timeout: Duration,
    pub dial_timeout: Duration,
    pub response_header_timeout: Duration,
    pub keep_alive_idle_timeout: Duration,
    pub keep_alive_probe_interval: Duration,
}

impl From<&SubgraphTrafficRules> for TransportOptions {
    fn from(rules: &SubgraphTrafficRules) -> Self {
        Self {
            request_timeout: rules.request_timeout,
            dial_timeout: rules.dial_timeout,
            response_header_timeout: rules.response_header_timeout,
            keep_alive_idle_timeout: rules.keep_alive_idle_timeout,
            keep_alive_probe_interval: rules.keep_alive_probe_interval,
        }
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

impl TransportOptions {
    pub fn client_builder(&self) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("federation-gateway/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(non_zero(self.keep_alive_probe_interval));

        if let Some(timeout) = non_zero(self.request_timeout) {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = non_zero(self.dial_timeout) {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = non_zero(self.response_header_timeout) {
            builder = builder.read_timeout(timeout);
        }
        if let Some(timeout) = non_zero(self.keep_alive_idle_timeout) {
            builder = builder.pool_idle_timeout(timeout);
        }
        builder
    }

    /// Build the client used for subgraph fetches.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        self.client_builder().build()
    }
}
