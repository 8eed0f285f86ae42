//! Security-related header handling.
//!
//! Only connection-scoped header stripping lives here; authentication and
//! rate limiting are left to the deployment in front of the gateway.

pub mod headers;

pub use headers::{is_hop_by_hop, strip_hop_by_hop, HOP_BY_HOP_HEADERS};
