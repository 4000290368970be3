/*
 * Responsibility
 * - shared context for the Router (AppState)
 *   - dispatcher: capability registry + hook chain (identity lives there, not here)
 *   - resource: protected-resource metadata advertised to clients
 * - cheap to clone (everything behind Arc)
 */
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::dispatch::Dispatcher;

/// OAuth 2.0 protected resource metadata (RFC 9728).
#[derive(Debug, Clone, Serialize)]
pub struct ProtectedResource {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<&'static str>,
    #[serde(skip)]
    pub metadata_url: String,
}

impl ProtectedResource {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resource: format!("{}/mcp", config.server_base_url),
            authorization_servers: vec![config.auth_issuer.clone()],
            scopes_supported: config.auth_required_scopes.clone(),
            bearer_methods_supported: vec!["header"],
            metadata_url: config.resource_metadata_url(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub resource: Arc<ProtectedResource>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, resource: ProtectedResource) -> Self {
        Self {
            dispatcher,
            resource: Arc::new(resource),
        }
    }
}
