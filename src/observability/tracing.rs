//! Operation spans.
//!
//! # Responsibilities
//! - Open the span a GraphQL operation runs in
//! - Declare every attribute the recorder fills in later
//!
//! # Design Decisions
//! - `tracing` spans cannot be renamed, so the display name lives in the
//!   `otel.name` field, which OpenTelemetry bridges use as the span name

use tracing::field::Empty;
use tracing::Span;

use crate::gateway::operation::OperationProtocol;

/// Span name used until the operation is known.
pub const DEFAULT_SPAN_NAME: &str = "operation";

/// Open the span for one client operation.
///
/// All `wg.*` fields start empty and are recorded as the operation is resolved.
pub fn operation_span(method: &str, path: &str, request_id: &str) -> Span {
    tracing::info_span!(
        "operation",
        otel.name = DEFAULT_SPAN_NAME,
        http.method = method,
        http.target = path,
        request_id = request_id,
        "wg.operation.name" = Empty,
        "wg.operation.type" = Empty,
        "wg.operation.content" = Empty,
        "wg.operation.hash" = Empty,
        "wg.operation.protocol" = Empty,
        "wg.client.name" = Empty,
        "wg.client.version" = Empty,
        http.status_code = Empty,
    )
}

/// `"http GetUser"`, or `"http unnamed"` for anonymous operations.
pub fn span_name(protocol: OperationProtocol, operation_name: &str) -> String {
    let name = if operation_name.is_empty() {
        "unnamed"
    } else {
        operation_name
    };
    format!("{} {}", protocol, name)
}
