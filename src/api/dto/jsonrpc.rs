//! JSON-RPC 2.0 envelope used by the MCP endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::AppError;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
// Implementation-defined server errors.
pub const UNAUTHENTICATED: i64 = -32001;
pub const FORBIDDEN: i64 = -32003;
pub const UNAVAILABLE: i64 = -32004;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn from_app_error(id: Value, err: &AppError) -> Self {
        let code = match err {
            AppError::BadRequest { .. } | AppError::NotFound { .. } => INVALID_PARAMS,
            AppError::AuthenticationRequired | AppError::AuthenticationFailed { .. } => {
                UNAUTHENTICATED
            }
            AppError::AuthorizationDenied { .. } => FORBIDDEN,
            AppError::CannotVerifyMembership | AppError::IdentityProviderUnavailable => UNAVAILABLE,
            AppError::Internal => INTERNAL_ERROR,
        };

        let mut data = json!({ "code": err.code() });
        if let Some(reason) = err.reason() {
            data["reason"] = json!(reason);
        }

        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: err.message(),
                data: Some(data),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}
