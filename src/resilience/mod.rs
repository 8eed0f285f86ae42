//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Subgraph fetch:
//!     → timeouts.rs (connect / read / total deadlines on the client)
//!
//! Usage export delivery:
//!     → retries.rs (retryable? within attempts and time budget?)
//!     → backoff.rs (exponential delay plus jitter)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Subgraph fetches are not retried; a GraphQL POST may be a mutation

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::RetryPolicy;
pub use timeouts::TransportOptions;
