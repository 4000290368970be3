//! Client-credentials grant (RFC 6749 §4.4).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::services::auth::principal::BearerToken;
use crate::services::oauth::endpoints::RealmEndpoints;
use crate::services::oauth::registrar::ClientRegistration;

/// Access token issued to this process. Lives in memory only.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: BearerToken,
    pub expires_at: DateTime<Utc>,
    pub scopes: BTreeSet<String>,
}

impl AccessToken {
    /// True once `now >= expires_at - margin`.
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        self.needs_refresh_at(Utc::now(), margin)
    }

    pub fn needs_refresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now >= self.expires_at - margin
    }
}

/// Clone so one failed refresh can be handed to every caller that waited on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenAcquisitionError {
    #[error("token request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("token request rejected at {url}: status={status}, response={body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_access_token(
        self,
        issued_at: DateTime<Utc>,
    ) -> Result<AccessToken, TokenAcquisitionError> {
        if self.access_token.trim().is_empty() {
            return Err(TokenAcquisitionError::InvalidResponse(
                "empty access_token".to_string(),
            ));
        }

        // Providers that omit expires_in get treated as already stale, so the next
        // caller asks again instead of trusting the token forever.
        let out_of_range =
            || TokenAcquisitionError::InvalidResponse("expires_in out of range".to_string());
        let lifetime =
            Duration::try_seconds(self.expires_in.unwrap_or(0).max(0)).ok_or_else(out_of_range)?;
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(out_of_range)?;

        let scopes = self
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(AccessToken {
            token: BearerToken::new(self.access_token),
            expires_at,
            scopes,
        })
    }
}

#[derive(Clone, Debug)]
pub struct TokenAcquirer {
    http: reqwest::Client,
    endpoints: RealmEndpoints,
}

impl TokenAcquirer {
    pub fn new(http: reqwest::Client, endpoints: RealmEndpoints) -> Self {
        Self { http, endpoints }
    }

    /// One round trip to the token endpoint. No retry, no caching.
    pub async fn request_token(
        &self,
        registration: &ClientRegistration,
    ) -> Result<AccessToken, TokenAcquisitionError> {
        let url = self.endpoints.token_url();
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", registration.client_id.as_str()),
            ("client_secret", registration.client_secret.expose()),
        ];

        let issued_at = Utc::now();
        let resp = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|source| TokenAcquisitionError::Transport {
                url: url.clone(),
                source: Arc::new(source),
            })?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                url = %url,
                status,
                client_id = %registration.client_id,
                "token request rejected"
            );
            return Err(TokenAcquisitionError::Rejected { url, status, body });
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| TokenAcquisitionError::InvalidResponse(e.to_string()))?;
        let token = raw.into_access_token(issued_at)?;

        info!(
            client_id = %registration.client_id,
            expires_at = %token.expires_at,
            token = %token.token.fingerprint(),
            "acquired access token"
        );

        Ok(token)
    }
}
