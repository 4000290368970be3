/*
 * Responsibility
 * - URL layout of the gateway
 * - /health and the metadata document are public; /mcp authenticates per invocation
 *   inside the dispatcher, so no route-level auth layer is needed
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handlers::{health::health, mcp::mcp, metadata::protected_resource};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/.well-known/oauth-protected-resource", get(protected_resource))
        .route("/mcp", post(mcp))
}
