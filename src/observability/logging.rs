//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber once at startup
//! - Pick JSON or human-readable output from configuration
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - JSON lines in production, pretty output for local runs

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing_subscriber::util::TryInitError;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("federation_gateway={level},tower_http={level},warn")
}

/// Install the global subscriber.
///
/// Fails if a subscriber has already been installed.
pub fn init_logging(level: &str, json: bool) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let json_layer = json.then(|| fmt::layer().json().with_current_span(true));
    let text_layer = (!json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_crate_and_http() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("federation_gateway=debug"));
        assert!(filter.contains("tower_http=debug"));
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
