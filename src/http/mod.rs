//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID + trace layers)
//!     → handler.rs (snapshot, recorder, plan, execute)
//!     → gateway executor (one outbound request per subgraph fetch)
//!     → response.rs (GraphQL error envelope on failure)
//!     → Send to client
//! ```

mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use response::GraphQLError;
pub use server::{AppState, GatewayServer, GatewayState, StartupError};
