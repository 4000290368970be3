/*
 * Responsibility
 * - POST /mcp: JSON-RPC 2.0 front of the dispatcher
 * - builds one RequestContext per request from the transport (request id, bearer token)
 * - maps AppError to HTTP status + JSON-RPC error, with the WWW-Authenticate challenge
 */
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::debug;

use crate::api::dto::jsonrpc::{
    self, CallToolParams, ReadResourceParams, RpcRequest, RpcResponse,
};
use crate::api::extractors::{BearerCredentials, RequestId};
use crate::dispatch::{CapabilityKind, Invocation, RequestContext};
use crate::error::AppError;
use crate::state::AppState;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "Expenses Tracker";

pub async fn mcp(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    BearerCredentials(token): BearerCredentials,
    body: Bytes,
) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            let res = RpcResponse::error(Value::Null, jsonrpc::PARSE_ERROR, e.to_string());
            return (StatusCode::BAD_REQUEST, Json(res)).into_response();
        }
    };
    let req: RpcRequest = match serde_json::from_value(raw) {
        Ok(req) => req,
        Err(e) => {
            let res = RpcResponse::error(Value::Null, jsonrpc::INVALID_REQUEST, e.to_string());
            return (StatusCode::BAD_REQUEST, Json(res)).into_response();
        }
    };
    if req.jsonrpc != "2.0" {
        let res = RpcResponse::error(
            req.id.unwrap_or(Value::Null),
            jsonrpc::INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        );
        return (StatusCode::BAD_REQUEST, Json(res)).into_response();
    }

    let Some(id) = req.id else {
        debug!(method = %req.method, "notification accepted");
        return StatusCode::ACCEPTED.into_response();
    };

    let ctx = RequestContext::new(request_id, token);

    match handle(&state, &req.method, req.params, &ctx).await {
        Ok(Some(result)) => Json(RpcResponse::result(id, result)).into_response(),
        Ok(None) => Json(RpcResponse::error(
            id,
            jsonrpc::METHOD_NOT_FOUND,
            format!("method not found: {}", req.method),
        ))
        .into_response(),
        Err(err) => error_response(&state, id, err),
    }
}

/// `Ok(None)` for unknown methods.
async fn handle(
    state: &AppState,
    method: &str,
    params: Value,
    ctx: &RequestContext,
) -> Result<Option<Value>, AppError> {
    let result = match method {
        "initialize" => {
            let version = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(PROTOCOL_VERSION);
            json!({
                "protocolVersion": version,
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "listChanged": false, "subscribe": false },
                },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            })
        }
        "ping" => json!({}),
        "tools/list" => {
            let tools: Vec<Value> = state
                .dispatcher
                .descriptors(CapabilityKind::Tool)
                .into_iter()
                .map(|d| {
                    json!({
                        "name": d.name,
                        "description": d.description,
                        "inputSchema": d.input_schema.clone().unwrap_or_else(|| json!({"type": "object"})),
                    })
                })
                .collect();
            json!({ "tools": tools })
        }
        "resources/list" => {
            let resources: Vec<Value> = state
                .dispatcher
                .descriptors(CapabilityKind::Resource)
                .into_iter()
                .map(|d| {
                    json!({
                        "uri": d.name,
                        "name": d.name,
                        "description": d.description,
                        "mimeType": d.mime_type,
                    })
                })
                .collect();
            json!({ "resources": resources })
        }
        "tools/call" => {
            let params: CallToolParams = serde_json::from_value(params)
                .map_err(|e| AppError::bad_request("INVALID_PARAMS", e.to_string()))?;
            let invocation = Invocation::tool(params.name, params.arguments);
            state.dispatcher.dispatch(&invocation, ctx).await?
        }
        "resources/read" => {
            let params: ReadResourceParams = serde_json::from_value(params)
                .map_err(|e| AppError::bad_request("INVALID_PARAMS", e.to_string()))?;
            let invocation = Invocation::resource(params.uri);
            state.dispatcher.dispatch(&invocation, ctx).await?
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn error_response(state: &AppState, id: Value, err: AppError) -> Response {
    let mut res = (err.status(), Json(RpcResponse::from_app_error(id, &err))).into_response();
    if let Some(challenge) = err
        .www_authenticate(Some(&state.resource.metadata_url))
        .and_then(|v| HeaderValue::from_str(&v).ok())
    {
        res.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
    }
    res
}
