//! Shared helpers: Ed25519 signing keys, JWK Sets and token minting.

#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use mcp_auth_gateway::services::auth::jwks::StaticJwks;
use mcp_auth_gateway::services::auth::{TokenVerifier, VerifierSettings};

pub const ISSUER: &str = "http://idp.test/realms/mcp";
pub const AUDIENCE: &str = "mcp-server";
pub const REQUIRED_SCOPE: &str = "mcp:access";

pub struct TestKey {
    pub kid: String,
    encoding: EncodingKey,
    public_x: String,
}

impl TestKey {
    /// Deterministic key from a one-byte seed.
    pub fn new(seed: u8, kid: &str) -> Self {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let der = signing.to_pkcs8_der().expect("encode pkcs8 der");
        let encoding = EncodingKey::from_ed_der(der.as_bytes());
        let public_x = URL_SAFE_NO_PAD.encode(signing.verifying_key().as_bytes());

        Self {
            kid: kid.to_string(),
            encoding,
            public_x,
        }
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": self.public_x,
            "kid": self.kid,
            "alg": "EdDSA",
            "use": "sig",
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding).expect("sign token")
    }

    /// Same signature, different `kid` in the header.
    pub fn sign_with_kid(&self, claims: &Value, kid: &str) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(kid.to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding).expect("sign token")
    }
}

pub fn jwks_json(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

pub fn jwk_set(keys: &[&TestKey]) -> JwkSet {
    serde_json::from_value(jwks_json(keys)).expect("valid jwk set")
}

/// Claims of a valid token for `sub`, expiring in ten minutes.
pub fn claims_for(sub: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "iat": now,
        "nbf": now,
        "exp": now + 600,
        "scope": format!("openid {}", REQUIRED_SCOPE),
    })
}

pub fn settings() -> VerifierSettings {
    VerifierSettings {
        issuer: ISSUER.to_string(),
        audience: AUDIENCE.to_string(),
        required_scopes: vec![REQUIRED_SCOPE.to_string()],
        principal_claim: "sub".to_string(),
        leeway_seconds: 5,
    }
}

pub fn static_verifier(keys: &[&TestKey]) -> Arc<TokenVerifier> {
    Arc::new(TokenVerifier::new(
        Arc::new(StaticJwks::new(jwk_set(keys))),
        settings(),
    ))
}
