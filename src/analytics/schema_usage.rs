//! Schema usage records.
//!
//! Field names follow the protobuf JSON mapping of the collector's
//! `SchemaUsageInfo` message.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gateway::operation::{OperationContext, OperationType};

/// Attribute carrying the HTTP status code of the client response.
pub const HTTP_STATUS_CODE_ATTRIBUTE: &str = "http_status_code";

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaUsageInfo {
    pub request_document: String,
    pub type_field_metrics: Vec<TypeFieldUsageInfo>,
    pub operation_info: OperationInfo,
    pub schema_info: SchemaInfo,
    pub client_info: UsageClientInfo,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeFieldUsageInfo {
    pub count: u64,
    pub path: Vec<String>,
    pub type_names: Vec<String>,
    #[serde(rename = "subgraphIDs")]
    pub subgraph_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageOperationType {
    Query,
    Mutation,
    Subscription,
}

impl From<OperationType> for UsageOperationType {
    fn from(op_type: OperationType) -> Self {
        match op_type {
            OperationType::Query => UsageOperationType::Query,
            OperationType::Mutation => UsageOperationType::Mutation,
            OperationType::Subscription => UsageOperationType::Subscription,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    #[serde(rename = "type")]
    pub op_type: UsageOperationType,
    /// Decimal rendering of the 64-bit operation hash.
    pub hash: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageClientInfo {
    pub name: String,
    pub version: String,
}

impl SchemaUsageInfo {
    /// Build the record for a finished operation. Every field usage of the
    /// plan is counted once.
    pub fn from_operation(
        operation: &OperationContext,
        schema_version: &str,
        attributes: Attributes,
    ) -> Self {
        let type_field_metrics = operation
            .plan
            .type_fields
            .iter()
            .map(|usage| TypeFieldUsageInfo {
                count: 1,
                path: usage.path.clone(),
                type_names: usage.type_names.clone(),
                subgraph_ids: usage.subgraph_ids.clone(),
            })
            .collect();

        Self {
            request_document: operation.content().to_string(),
            type_field_metrics,
            operation_info: OperationInfo {
                op_type: operation.op_type().into(),
                hash: operation.hash().to_string(),
                name: operation.name().to_string(),
            },
            schema_info: SchemaInfo {
                version: schema_version.to_string(),
            },
            client_info: UsageClientInfo {
                name: operation.client_info.name.clone(),
                version: operation.client_info.version.clone(),
            },
            attributes,
        }
    }
}
