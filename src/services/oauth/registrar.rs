//! Dynamic Client Registration (RFC 7591) against the realm's DCR endpoint.
//!
//! Registration is NOT idempotent: every successful call creates a new client on the
//! provider. The gateway only registers when explicitly asked to, and persists the
//! result through `CredentialStore`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::services::oauth::endpoints::RealmEndpoints;

/// Client secret issued by the provider. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClientSecret(***)")
    }
}

/// Credentials of a registered OAuth2 client. Immutable once created.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: ClientSecret,
    pub registered_at: DateTime<Utc>,
}

impl ClientRegistration {
    /// Registration supplied by deployment configuration instead of DCR.
    pub fn from_parts(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: ClientSecret::new(client_secret),
            registered_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("registration request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("registration rejected at {url}: status={status}, response={body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },
    #[error("invalid registration response: {0}")]
    InvalidResponse(String),
    #[error("credential file {path}: {message}")]
    Storage { path: String, message: String },
}

#[derive(Debug, Deserialize)]
struct DcrResponse {
    client_id: String,
    client_secret: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CredentialRegistrar {
    http: reqwest::Client,
    endpoints: RealmEndpoints,
}

impl CredentialRegistrar {
    pub fn new(http: reqwest::Client, endpoints: RealmEndpoints) -> Self {
        Self { http, endpoints }
    }

    /// Register a confidential client allowed to use the client-credentials grant.
    ///
    /// `client_name_prefix` is suffixed with a timestamp and a random tag so repeated
    /// registrations never collide on name.
    pub async fn register(
        &self,
        client_name_prefix: &str,
    ) -> Result<ClientRegistration, RegistrationError> {
        let url = self.endpoints.registration_url();
        let client_name = unique_client_name(client_name_prefix, Utc::now());

        let body = json!({
            "client_name": client_name,
            "grant_types": ["client_credentials"],
            "token_endpoint_auth_method": "client_secret_basic",
        });

        info!(url = %url, client_name = %client_name, "registering client via DCR");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| RegistrationError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status().as_u16();
        if status != 200 && status != 201 {
            let body = resp.text().await.unwrap_or_default();
            warn!(url = %url, status, "DCR registration rejected");
            return Err(RegistrationError::Rejected { url, status, body });
        }

        let dcr: DcrResponse = resp
            .json()
            .await
            .map_err(|e| RegistrationError::InvalidResponse(e.to_string()))?;

        if dcr.client_id.trim().is_empty() {
            return Err(RegistrationError::InvalidResponse(
                "empty client_id".to_string(),
            ));
        }
        let client_secret = dcr
            .client_secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                RegistrationError::InvalidResponse("missing client_secret".to_string())
            })?;

        info!(client_id = %dcr.client_id, "registered client");

        Ok(ClientRegistration {
            client_id: dcr.client_id,
            client_secret: ClientSecret::new(client_secret),
            registered_at: Utc::now(),
        })
    }
}

fn unique_client_name(prefix: &str, now: DateTime<Utc>) -> String {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d-%H%M%S"), &tag[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn client_names_carry_prefix_timestamp_and_random_tag() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let a = unique_client_name("agent", now);
        let b = unique_client_name("agent", now);

        assert!(a.starts_with("agent-20260301-123005-"));
        assert_eq!(a.len(), "agent-20260301-123005-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let reg = ClientRegistration::from_parts("client-1", "s3cr3t");
        let printed = format!("{:?}", reg);

        assert!(printed.contains("client-1"));
        assert!(!printed.contains("s3cr3t"));
    }
}
