use axum::{Json, extract::State};

use crate::state::{AppState, ProtectedResource};

/// GET /.well-known/oauth-protected-resource
pub async fn protected_resource(State(state): State<AppState>) -> Json<ProtectedResource> {
    Json(state.resource.as_ref().clone())
}
