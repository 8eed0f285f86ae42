//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! GraphQL request:
//!     → tracing.rs (operation span with wg.* fields)
//!     → operation.rs (recorder accumulates attributes, emits on finish)
//!     → metrics.rs (MetricsBackend → `metrics` facade → Prometheus)
//!     → analytics::exporter (schema usage, off the request path)
//!
//! Process:
//!     → logging.rs (global subscriber, JSON or pretty)
//! ```
//!
//! # Design Decisions
//! - Disabled telemetry swaps in a no-op recorder; call sites never branch
//! - Request ID flows through the span and the `x-request-id` header

pub mod logging;
pub mod metrics;
pub mod operation;
pub mod tracing;

pub use self::metrics::{InFlightGuard, KeyValue, MetricsBackend, PrometheusMetrics};
pub use operation::{NoopRecorder, OperationMetrics, OperationRecorder, RouterMetrics, Telemetry};
