//! Resolved GraphQL operations and their prepared plans.

use std::fmt;

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::context::ClientInfo;

/// GraphQL-over-HTTP request envelope.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        }
    }

    /// Name of the root type fields of this operation are selected on.
    pub fn root_type_name(&self) -> &'static str {
        match self {
            OperationType::Query => "Query",
            OperationType::Mutation => "Mutation",
            OperationType::Subscription => "Subscription",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport the operation arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationProtocol {
    Http,
    GraphQLWs,
}

impl OperationProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationProtocol::Http => "http",
            OperationProtocol::GraphQLWs => "graphql-ws",
        }
    }
}

impl fmt::Display for OperationProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation selected from the client document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOperation {
    /// Stable hash of the document.
    pub id: u64,
    /// Operation name; empty for anonymous operations.
    pub name: String,
    pub op_type: OperationType,
    /// Raw document text.
    pub query: String,
}

/// Usage of one schema field by an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFieldUsage {
    pub path: Vec<String>,
    pub type_names: Vec<String>,
    /// IDs of the subgraphs that resolve the field.
    pub subgraph_ids: Vec<String>,
}

/// A request to one subgraph.
#[derive(Debug, Clone)]
pub struct SubgraphFetch {
    /// Name of the destination subgraph.
    pub subgraph: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct PreparedPlan {
    pub fetches: Vec<SubgraphFetch>,
    pub type_fields: Vec<TypeFieldUsage>,
}

/// Everything known about an operation once it has been planned.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: ParsedOperation,
    pub client_info: ClientInfo,
    pub plan: PreparedPlan,
}

impl OperationContext {
    pub fn name(&self) -> &str {
        &self.operation.name
    }

    pub fn op_type(&self) -> OperationType {
        self.operation.op_type
    }

    pub fn hash(&self) -> u64 {
        self.operation.id
    }

    pub fn content(&self) -> &str {
        &self.operation.query
    }
}
