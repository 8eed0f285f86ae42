//! Connection-scoped header handling.
//!
//! # Responsibilities
//! - Define the hop-by-hop header set (RFC 9110 §7.6.1)
//! - Strip hop-by-hop headers from outbound subgraph requests
//! - List the headers a client nominates in `Connection`
//! - Define headers owned by the subgraph client (framing and encoding)
//!
//! # Design Decisions
//! - Stripping is unconditional and runs after every header rule
//! - Nominated headers are excluded when rules copy client headers, so a
//!   client cannot remove headers the gateway sets itself

use axum::http::header::{self, HeaderMap, HeaderName};

/// Headers meaningful only for a single connection.
pub const HOP_BY_HOP_HEADERS: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Headers the subgraph client sets itself.
pub const TRANSPORT_MANAGED_HEADERS: [HeaderName; 5] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    header::CONTENT_ENCODING,
    header::ACCEPT_ENCODING,
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name)
}

pub fn is_transport_managed(name: &HeaderName) -> bool {
    TRANSPORT_MANAGED_HEADERS.contains(name)
}

/// Header names listed in the client's `Connection` header.
pub fn connection_nominated(client: &HeaderMap) -> Vec<HeaderName> {
    client
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::try_from(token.trim()).ok())
        .collect()
}

/// Remove every hop-by-hop header from `outbound`.
pub fn strip_hop_by_hop(outbound: &mut HeaderMap) {
    for name in &HOP_BY_HOP_HEADERS {
        outbound.remove(name);
    }
}
