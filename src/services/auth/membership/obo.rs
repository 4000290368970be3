//! On-behalf-of exchange: trade the caller's access token for a token scoped to the
//! directory API, keeping the caller's identity.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::services::auth::principal::BearerToken;
use crate::services::oauth::ClientSession;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Wire flavor of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OboGrant {
    /// `jwt-bearer` with `requested_token_use=on_behalf_of` (Entra ID).
    JwtBearer,
    /// RFC 8693 token exchange (Keycloak and most other providers).
    TokenExchange,
}

impl FromStr for OboGrant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwt-bearer" | "on-behalf-of" | "obo" => Ok(Self::JwtBearer),
            "token-exchange" => Ok(Self::TokenExchange),
            other => Err(format!("unknown on-behalf-of grant '{}'", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OboError {
    #[error("on-behalf-of request failed: {0}")]
    Transport(String),
    #[error("on-behalf-of exchange rejected: status={status}, error={error}: {description}")]
    Rejected {
        status: u16,
        error: String,
        description: String,
    },
    #[error("invalid on-behalf-of response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait OboExchange: Send + Sync {
    async fn exchange(&self, user_assertion: &BearerToken) -> Result<BearerToken, OboError>;
}

/// Exchanger that authenticates to the token endpoint with the gateway's own
/// client registration.
pub struct HttpOboExchanger {
    http: reqwest::Client,
    token_url: String,
    scope: String,
    grant: OboGrant,
    session: Arc<ClientSession>,
}

impl HttpOboExchanger {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        scope: impl Into<String>,
        grant: OboGrant,
        session: Arc<ClientSession>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            scope: scope.into(),
            grant,
            session,
        }
    }
}

#[async_trait]
impl OboExchange for HttpOboExchanger {
    async fn exchange(&self, user_assertion: &BearerToken) -> Result<BearerToken, OboError> {
        let registration = self.session.registration();
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", registration.client_id.as_str()),
            ("client_secret", registration.client_secret.expose()),
            ("scope", self.scope.as_str()),
        ];
        match self.grant {
            OboGrant::JwtBearer => {
                params.push(("grant_type", JWT_BEARER_GRANT));
                params.push(("assertion", user_assertion.as_str()));
                params.push(("requested_token_use", "on_behalf_of"));
            }
            OboGrant::TokenExchange => {
                params.push(("grant_type", TOKEN_EXCHANGE_GRANT));
                params.push(("subject_token", user_assertion.as_str()));
                params.push(("subject_token_type", ACCESS_TOKEN_TYPE));
                params.push(("requested_token_type", ACCESS_TOKEN_TYPE));
            }
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| OboError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| OboError::InvalidResponse(e.to_string()))?;

        // Some providers answer 200 with an `error` member.
        if status != 200 || body.get("error").is_some() {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            warn!(status, error = %error, "on-behalf-of exchange rejected");
            return Err(OboError::Rejected {
                status,
                error,
                description,
            });
        }

        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(BearerToken::new)
            .ok_or_else(|| OboError::InvalidResponse("missing access_token".to_string()))
    }
}
