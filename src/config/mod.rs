//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/TOML)
//!     → loader.rs (env expansion, parse, env overrides)
//!     → validation.rs (semantic checks, header rule compilation)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → server swaps its snapshot atomically
//!     → in-flight requests finish on the snapshot they started with
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod units;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_config_or_default, ConfigError};
pub use schema::{
    GatewayConfig, GlobalHeaderRule, HeaderRules, RequestHeaderRule, SubgraphConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
