//! Subgraph fetch execution.
//!
//! # Responsibilities
//! - Build the outbound request for every fetch of a plan
//! - Apply header rules to each outbound request
//! - Send fetches concurrently and combine the responses
//!
//! # Design Decisions
//! - One fetch: the subgraph body is returned untouched
//! - Several fetches: `data` objects are merged key by key and `errors`
//!   arrays are concatenated in fetch order
//! - Any transport failure or non-2xx subgraph status fails the operation

use axum::body::Bytes;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use futures_util::future::join_all;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::Instrument;

use crate::gateway::context::RequestContext;
use crate::gateway::operation::{PreparedPlan, SubgraphFetch};
use crate::headers::HeaderTransformer;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("subgraph `{0}` is not configured")]
    UnknownSubgraph(String),

    #[error("failed to build request for subgraph `{subgraph}`: {source}")]
    Build {
        subgraph: String,
        #[source]
        source: axum::http::Error,
    },

    #[error("request to subgraph `{subgraph}` failed: {source}")]
    Transport {
        subgraph: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("subgraph `{subgraph}` responded with {status}")]
    Status { subgraph: String, status: StatusCode },

    #[error("invalid response from subgraph `{subgraph}`: {source}")]
    InvalidResponse {
        subgraph: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode merged response: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SubgraphExecutor {
    client: reqwest::Client,
}

impl SubgraphExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Run every fetch of `plan` and return the client response body.
    pub async fn execute(
        &self,
        plan: &PreparedPlan,
        ctx: &RequestContext,
        transformer: &HeaderTransformer,
    ) -> Result<Bytes, ExecuteError> {
        let fetches = plan.fetches.iter().map(|fetch| {
            let span = tracing::debug_span!("subgraph_fetch", subgraph = %fetch.subgraph);
            self.fetch(fetch, ctx, transformer).instrument(span)
        });
        let mut bodies = join_all(fetches)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        if bodies.len() == 1 {
            return Ok(bodies.remove(0));
        }
        merge_responses(&plan.fetches, bodies)
    }

    async fn fetch(
        &self,
        fetch: &SubgraphFetch,
        ctx: &RequestContext,
        transformer: &HeaderTransformer,
    ) -> Result<Bytes, ExecuteError> {
        let subgraph = ctx
            .subgraph_by_name(&fetch.subgraph)
            .ok_or_else(|| ExecuteError::UnknownSubgraph(fetch.subgraph.clone()))?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(subgraph.url.as_str())
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .body(fetch.body.clone())
            .map_err(|source| ExecuteError::Build {
                subgraph: subgraph.name.clone(),
                source,
            })?;
        let request = transformer.on_origin_request(request, ctx);

        let request = reqwest::Request::try_from(request).map_err(|source| ExecuteError::Transport {
            subgraph: subgraph.name.clone(),
            source,
        })?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| ExecuteError::Transport {
                subgraph: subgraph.name.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(subgraph = %subgraph.name, status = %status, "Subgraph returned an error status");
            return Err(ExecuteError::Status {
                subgraph: subgraph.name.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| ExecuteError::Transport {
            subgraph: subgraph.name.clone(),
            source,
        })?;
        tracing::debug!(subgraph = %subgraph.name, bytes = body.len(), "Subgraph responded");
        Ok(body)
    }
}

fn merge_responses(fetches: &[SubgraphFetch], bodies: Vec<Bytes>) -> Result<Bytes, ExecuteError> {
    let mut data = Map::new();
    let mut errors = Vec::new();
    let mut has_data = false;

    for (fetch, body) in fetches.iter().zip(bodies) {
        let response: Value =
            serde_json::from_slice(&body).map_err(|source| ExecuteError::InvalidResponse {
                subgraph: fetch.subgraph.clone(),
                source,
            })?;

        if let Some(Value::Object(fields)) = response.get("data") {
            has_data = true;
            data.extend(fields.clone());
        }
        if let Some(Value::Array(items)) = response.get("errors") {
            errors.extend(items.iter().cloned());
        }
    }

    let mut merged = Map::new();
    if has_data {
        merged.insert("data".to_string(), Value::Object(data));
    } else {
        merged.insert("data".to_string(), Value::Null);
    }
    if !errors.is_empty() {
        merged.insert("errors".to_string(), Value::Array(errors));
    }

    serde_json::to_vec(&merged)
        .map(Bytes::from)
        .map_err(ExecuteError::Encode)
}
