/// Factories: build the auth services from application `Config`.
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::services::auth::jwks::RemoteJwks;
use crate::services::auth::membership::{
    GraphGroupDirectory, HttpOboExchanger, MembershipCache, MembershipService,
};
use crate::services::auth::verifier::{TokenVerifier, VerifierSettings};
use crate::services::cache::{CacheClient, CacheError, MemoryCache, ValkeyClient};
use crate::services::oauth::ClientSession;

pub fn build_token_verifier(config: &Config, http: reqwest::Client) -> Arc<TokenVerifier> {
    let keys = RemoteJwks::new(http, config.auth_jwks_url.clone(), config.jwks_cache_ttl);

    Arc::new(TokenVerifier::new(
        Arc::new(keys),
        VerifierSettings {
            issuer: config.auth_issuer.clone(),
            audience: config.auth_audience.clone(),
            required_scopes: config.auth_required_scopes.clone(),
            principal_claim: config.auth_principal_claim.clone(),
            leeway_seconds: config.access_token_leeway_seconds,
        },
    ))
}

/// `None` when no admin group is configured or the gateway has no client session.
pub async fn build_membership_service(
    config: &Config,
    http: reqwest::Client,
    session: Option<Arc<ClientSession>>,
) -> Result<Option<Arc<MembershipService>>, CacheError> {
    let (Some(_), Some(session)) = (&config.admin_group_id, session) else {
        return Ok(None);
    };

    let obo = HttpOboExchanger::new(
        http.clone(),
        config.obo_token_url.clone(),
        config.obo_scope.clone(),
        config.obo_grant,
        session,
    );
    let directory = GraphGroupDirectory::new(http, &config.group_directory_url);
    let mut service = MembershipService::new(Arc::new(obo), Arc::new(directory));

    if let Some(ttl) = config.membership_cache_ttl {
        let client: Arc<dyn CacheClient> = match &config.valkey_url {
            Some(url) => Arc::new(ValkeyClient::new(url).await?),
            None => Arc::new(MemoryCache::new()),
        };
        info!(
            backend = client.backend_name(),
            ttl_secs = ttl.as_secs(),
            "membership cache enabled"
        );
        service = service.with_cache(MembershipCache::new(client, ttl));
    }

    Ok(Some(Arc::new(service)))
}
