//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger()
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting and drains
//!             → config watcher loop exits
//!             → export worker drains its queue and flushes
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
