//! Federation gateway library.
//!
//! Accepts client GraphQL requests, fans them out to subgraphs with
//! rule-driven header propagation, and records per-operation telemetry and
//! schema usage off the request path.

pub mod analytics;
pub mod config;
pub mod gateway;
pub mod headers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use headers::HeaderTransformer;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use observability::Telemetry;
