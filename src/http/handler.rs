//! GraphQL request handler.
//!
//! # Request flow
//! ```text
//! snapshot ─▶ span + recorder ─▶ read body ─▶ parse ─▶ plan ─▶ execute ─▶ finish
//! ```
//! The configuration snapshot is loaded once; a reload during the request
//! does not affect it. The recorder is finished on every path, including
//! errors.

use std::sync::Arc;

use axum::body::{self, Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::gateway::{
    ClientInfo, GraphQLRequest, OperationContext, OperationProtocol, RequestContext,
};
use crate::http::request::RequestIdExt;
use crate::http::response::GraphQLError;
use crate::http::server::{AppState, GatewayState};
use crate::observability::operation::{OperationRecorder, UNKNOWN};
use crate::observability::tracing::operation_span;

pub(crate) async fn graphql_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response {
    let snapshot = state.snapshot();
    let span = operation_span(
        request.method().as_str(),
        request.uri().path(),
        request.request_id(),
    );
    let content_length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(UNKNOWN);

    let mut recorder =
        state
            .telemetry
            .start_operation(&snapshot.config.version, content_length, span.clone());

    let result = serve(&snapshot, request, &mut *recorder)
        .instrument(span.clone())
        .await;

    let (status, body) = match result {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            span.in_scope(|| {
                tracing::warn!(status = err.status.as_u16(), error = %err.message, "GraphQL request failed")
            });
            (err.status, Bytes::from(err.body()))
        }
    };

    recorder.finish(Some(status.as_u16()), Some(body.len() as u64));

    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

async fn serve(
    state: &GatewayState,
    request: Request<Body>,
    recorder: &mut dyn OperationRecorder,
) -> Result<Bytes, GraphQLError> {
    let (parts, body) = request.into_parts();

    let limit = state.config.traffic_shaping.router.max_request_body_size.bytes();
    let body = body::to_bytes(body, usize::try_from(limit).unwrap_or(usize::MAX))
        .await
        .map_err(|e| {
            GraphQLError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("failed to read request body: {}", e),
            )
        })?;

    let graphql: GraphQLRequest = serde_json::from_slice(&body).map_err(|e| {
        GraphQLError::new(StatusCode::BAD_REQUEST, format!("invalid GraphQL request: {}", e))
    })?;

    let operation = state.planner.parse(&graphql)?;
    recorder.add_operation(&operation, OperationProtocol::Http);

    let client_info = ClientInfo::from_headers(&parts.headers);
    recorder.add_client_info(&client_info);

    let plan = state.planner.plan(&operation, &graphql, &body)?;
    let operation = Arc::new(OperationContext {
        operation,
        client_info,
        plan,
    });
    recorder.add_operation_context(operation.clone());

    tracing::debug!(
        operation = %operation.name(),
        fetches = operation.plan.fetches.len(),
        "Operation planned"
    );

    let mut ctx = RequestContext::new(parts, state.subgraphs.clone());
    ctx.set_operation(operation.clone());

    let response = state
        .executor
        .execute(&operation.plan, &ctx, &state.transformer)
        .await?;
    Ok(response)
}
