//! Header propagation.
//!
//! # Data Flow
//! ```text
//! HeaderRules (config)
//!     → rules.rs (validate & compile each rule)
//!     → transformer.rs (one chain for `all`, one per subgraph)
//!     → on_origin_request() for every outbound subgraph request
//! ```
//!
//! # Design Decisions
//! - Compilation happens once per configuration snapshot; requests only read
//! - A broken rule rejects the whole ruleset, never a partial one

pub mod rules;
pub mod transformer;

pub use rules::{CompiledRule, HeaderRuleError, RuleScope};
pub use transformer::HeaderTransformer;
