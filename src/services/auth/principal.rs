/*
 * Responsibility
 * - Types that carry identity through a single request
 * - BearerToken: raw credential, never printed
 * - VerifiedPrincipal: what the verifier proved about the caller
 * - Caller: principal + the token it was proven from (needed for on-behalf-of exchange)
 */
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 prefix, safe to log for correlation.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let hex = format!("{:x}", digest);
        format!("sha256:{}", &hex[..12])
    }

    /// Value for an `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BearerToken({})", self.fingerprint())
    }
}

/// Identity proven from a cryptographically verified token.
///
/// Only the verifier constructs this; `principal_id` is never taken from unauthenticated
/// input.
#[derive(Debug, Clone)]
pub struct VerifiedPrincipal {
    pub principal_id: String,
    pub claims: Map<String, Value>,
    pub scopes: BTreeSet<String>,
    pub token_expiry: DateTime<Utc>,
}

impl VerifiedPrincipal {
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Caller {
    pub principal: VerifiedPrincipal,
    pub token: BearerToken,
}

impl Caller {
    pub fn principal_id(&self) -> &str {
        &self.principal.principal_id
    }
}
