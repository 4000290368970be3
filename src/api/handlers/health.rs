/*
 * Responsibility
 * - GET /health (liveness)
 * - never touches the dispatcher, so no identity hook runs
 */
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "healthy", "service": "mcp-server"})),
    )
}
