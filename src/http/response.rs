//! GraphQL error responses.
//!
//! Failures before or during execution are returned to the client as a
//! GraphQL response with an `errors` array and no `data`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::gateway::{ExecuteError, PlanError};

/// An error that ends a client request.
#[derive(Debug)]
pub struct GraphQLError {
    pub status: StatusCode,
    pub message: String,
}

impl GraphQLError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn body(&self) -> String {
        json!({ "errors": [{ "message": self.message }] }).to_string()
    }
}

impl From<PlanError> for GraphQLError {
    fn from(err: PlanError) -> Self {
        let status = match err {
            PlanError::NoSubgraphs | PlanError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ExecuteError> for GraphQLError {
    fn from(err: ExecuteError) -> Self {
        let status = match err {
            ExecuteError::Encode(_) | ExecuteError::Build { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for GraphQLError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body()).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
