use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::services::auth::jwks::{KeySetError, KeySource};
use crate::services::auth::principal::{BearerToken, VerifiedPrincipal};

/// Signature algorithms accepted on inbound tokens. Symmetric algorithms are excluded:
/// a published key set only ever carries public keys.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Why a bearer token was rejected. Each variant has its own reason code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed token")]
    Malformed,
    #[error("no published key matches the token")]
    UnknownKey,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    ExpiredToken,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token issuer does not match")]
    WrongIssuer,
    #[error("token audience does not match")]
    WrongAudience,
    #[error("token lacks required scopes: {}", missing.join(" "))]
    InsufficientScope { missing: Vec<String> },
    #[error("token lacks principal claim '{0}'")]
    MissingPrincipalClaim(String),
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),
}

impl VerifyError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnknownKey => "unknown_key",
            Self::InvalidSignature => "invalid_signature",
            Self::ExpiredToken => "expired_token",
            Self::NotYetValid => "not_yet_valid",
            Self::WrongIssuer => "wrong_issuer",
            Self::WrongAudience => "wrong_audience",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::MissingPrincipalClaim(_) => "missing_principal_claim",
            Self::KeySetUnavailable(_) => "key_set_unavailable",
        }
    }
}

impl From<KeySetError> for VerifyError {
    fn from(e: KeySetError) -> Self {
        match e {
            KeySetError::Unavailable(msg) => Self::KeySetUnavailable(msg),
            KeySetError::UnknownKey(_) => Self::UnknownKey,
        }
    }
}

fn classify(e: &jsonwebtoken::errors::Error) -> VerifyError {
    match e.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidKeyFormat => {
            VerifyError::InvalidSignature
        }
        ErrorKind::ExpiredSignature => VerifyError::ExpiredToken,
        ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
        ErrorKind::InvalidIssuer => VerifyError::WrongIssuer,
        ErrorKind::InvalidAudience => VerifyError::WrongAudience,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => VerifyError::WrongIssuer,
            "aud" => VerifyError::WrongAudience,
            _ => VerifyError::Malformed,
        },
        _ => VerifyError::Malformed,
    }
}

/// Scopes granted by the token: `scope` (Keycloak, space separated) or `scp` (Entra,
/// string or array).
fn granted_scopes(claims: &Map<String, Value>) -> BTreeSet<String> {
    let mut scopes = BTreeSet::new();
    for name in ["scope", "scp"] {
        match claims.get(name) {
            Some(Value::String(s)) => scopes.extend(s.split_whitespace().map(str::to_string)),
            Some(Value::Array(items)) => scopes.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string),
            ),
            _ => {}
        }
    }
    scopes
}

#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub issuer: String,
    pub audience: String,
    pub required_scopes: Vec<String>,
    /// Claim holding the principal id (`sub` for Keycloak, `oid` for Entra).
    pub principal_claim: String,
    pub leeway_seconds: u64,
}

/// Verifies inbound bearer tokens against the provider's published keys.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<dyn KeySource>,
    settings: VerifierSettings,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("settings", &self.settings)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(keys: Arc<dyn KeySource>, settings: VerifierSettings) -> Self {
        Self { keys, settings }
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    /// Verify signature, lifetime, issuer, audience and scopes, then extract the principal.
    ///
    /// This is the only place a `VerifiedPrincipal` is created.
    pub async fn verify(&self, token: &BearerToken) -> Result<VerifiedPrincipal, VerifyError> {
        let raw = token.as_str();
        if raw.trim().is_empty() {
            return Err(VerifyError::Malformed);
        }

        let header = jsonwebtoken::decode_header(raw).map_err(|_| VerifyError::Malformed)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(VerifyError::InvalidSignature);
        }

        let jwk = self.keys.key_for(header.kid.as_deref()).await?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|_| VerifyError::InvalidSignature)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.set_audience(&[self.settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = self.settings.leeway_seconds;

        let data = jsonwebtoken::decode::<Map<String, Value>>(raw, &decoding_key, &validation)
            .map_err(|e| classify(&e))?;
        let claims = data.claims;

        let scopes = granted_scopes(&claims);
        let missing: Vec<String> = self
            .settings
            .required_scopes
            .iter()
            .filter(|s| !scopes.contains(s.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(VerifyError::InsufficientScope { missing });
        }

        let principal_id = claims
            .get(&self.settings.principal_claim)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                VerifyError::MissingPrincipalClaim(self.settings.principal_claim.clone())
            })?
            .to_string();

        let token_expiry = claims
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
            .ok_or(VerifyError::Malformed)?;

        Ok(VerifiedPrincipal {
            principal_id,
            claims,
            scopes,
            token_expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn reason_codes_are_unique() {
        let all = [
            VerifyError::Malformed,
            VerifyError::UnknownKey,
            VerifyError::InvalidSignature,
            VerifyError::ExpiredToken,
            VerifyError::NotYetValid,
            VerifyError::WrongIssuer,
            VerifyError::WrongAudience,
            VerifyError::InsufficientScope { missing: vec![] },
            VerifyError::MissingPrincipalClaim("sub".into()),
            VerifyError::KeySetUnavailable("down".into()),
        ];
        let codes: BTreeSet<_> = all.iter().map(VerifyError::reason_code).collect();

        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn scopes_are_read_from_scope_and_scp_claims() {
        let from_scope = granted_scopes(&claims(json!({"scope": "openid mcp:access"})));
        let from_scp_array = granted_scopes(&claims(json!({"scp": ["mcp-access"]})));
        let from_scp_string = granted_scopes(&claims(json!({"scp": "mcp-access other"})));

        assert!(from_scope.contains("mcp:access") && from_scope.contains("openid"));
        assert!(from_scp_array.contains("mcp-access"));
        assert_eq!(from_scp_string.len(), 2);
        assert!(granted_scopes(&claims(json!({}))).is_empty());
    }
}
