//! Per-request state.
//!
//! # Responsibilities
//! - Describe the subgraphs a request may be sent to
//! - Hold the client request head and the resolved operation for the
//!   lifetime of one client request
//! - Resolve which subgraph an outbound request is addressed to

use std::sync::Arc;

use axum::http::{request::Parts, HeaderMap, Uri};
use tracing::Span;
use url::Url;

use crate::config::GatewayConfig;
use crate::gateway::operation::OperationContext;

/// A backend GraphQL service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgraph {
    /// Name used to look up subgraph-specific header rules.
    pub name: String,
    /// Identifier reported in usage records.
    pub id: String,
    /// Endpoint outbound requests are sent to.
    pub url: Url,
}

impl Subgraph {
    pub fn new(name: impl Into<String>, id: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            url,
        }
    }

    /// Build the subgraph list from configuration, applying routing URL overrides.
    pub fn from_config(config: &GatewayConfig) -> Result<Vec<Subgraph>, url::ParseError> {
        config
            .subgraphs
            .iter()
            .map(|s| {
                let url = Url::parse(config.routing_url(s))?;
                Ok(Subgraph::new(s.name.clone(), s.id().to_string(), url))
            })
            .collect()
    }

    fn same_origin(&self, uri: &Uri) -> bool {
        let scheme = uri.scheme_str().unwrap_or("http");
        let Some(host) = uri.host() else {
            return false;
        };
        let port = uri.port_u16().or(match scheme {
            "https" => Some(443),
            "http" => Some(80),
            _ => None,
        });

        self.url.scheme() == scheme
            && self
                .url
                .host_str()
                .is_some_and(|h| h.eq_ignore_ascii_case(host))
            && self.url.port_or_known_default() == port
    }
}

/// Client name and version, as announced by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    const NAME_HEADERS: [&'static str; 2] = ["graphql-client-name", "apollographql-client-name"];
    const VERSION_HEADERS: [&'static str; 2] =
        ["graphql-client-version", "apollographql-client-version"];

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| headers.get(*n).and_then(|v| v.to_str().ok()))
                .filter(|v| !v.is_empty())
                .unwrap_or("unknown")
                .to_string()
        };

        Self {
            name: first(&Self::NAME_HEADERS),
            version: first(&Self::VERSION_HEADERS),
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "unknown".to_string(),
        }
    }
}

/// State owned by the task serving one client request.
#[derive(Debug)]
pub struct RequestContext {
    request: Parts,
    subgraphs: Arc<[Subgraph]>,
    operation: Option<Arc<OperationContext>>,
    span: Span,
}

impl RequestContext {
    pub fn new(request: Parts, subgraphs: Arc<[Subgraph]>) -> Self {
        Self {
            request,
            subgraphs,
            operation: None,
            span: Span::current(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn set_operation(&mut self, operation: Arc<OperationContext>) {
        self.operation = Some(operation);
    }

    /// The client request head.
    pub fn request(&self) -> &Parts {
        &self.request
    }

    pub fn client_headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    pub fn subgraphs(&self) -> &[Subgraph] {
        &self.subgraphs
    }

    pub fn operation(&self) -> Option<&Arc<OperationContext>> {
        self.operation.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Find the subgraph an outbound request to `uri` is addressed to.
    ///
    /// Scheme, host and port must match; when several subgraphs share an
    /// origin the one with the same path wins.
    pub fn subgraph_for(&self, uri: &Uri) -> Option<&Subgraph> {
        let mut candidates = self.subgraphs.iter().filter(|s| s.same_origin(uri));
        let first = candidates.next()?;
        if first.url.path() == uri.path() {
            return Some(first);
        }
        candidates
            .find(|s| s.url.path() == uri.path())
            .or(Some(first))
    }

    pub fn subgraph_by_name(&self, name: &str) -> Option<&Subgraph> {
        self.subgraphs.iter().find(|s| s.name == name)
    }
}
