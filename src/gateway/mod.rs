//! GraphQL request path.
//!
//! # Data Flow
//! ```text
//! client body
//!     → planner.rs (select operation, route root fields, build fetches)
//!     → operation.rs (ParsedOperation, PreparedPlan, OperationContext)
//!     → executor.rs (header rules per fetch, concurrent send, merge)
//! ```
//! `context.rs` carries the client request and candidate subgraphs through
//! every step.

pub mod context;
pub mod executor;
pub mod operation;
pub mod planner;

pub use context::{ClientInfo, RequestContext, Subgraph};
pub use executor::{ExecuteError, SubgraphExecutor};
pub use operation::{GraphQLRequest, OperationContext, OperationProtocol, OperationType, ParsedOperation};
pub use planner::{PlanError, Planner, RootFieldPlanner};
