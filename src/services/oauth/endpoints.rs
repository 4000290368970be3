//! Realm URL layout of an OIDC identity provider.
//!
//! All provider endpoints hang off a single realm URL
//! (ex: `https://idp.example.com/realms/mcp`). The URL is parsed only for validation;
//! the configured text is kept verbatim minus trailing slashes, because the verifier
//! compares `iss` byte for byte and `Url` would rewrite host case and default ports.

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid realm url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("realm url must use http or https, got '{0}'")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmEndpoints {
    realm_url: String,
    https: bool,
}

impl RealmEndpoints {
    pub fn new(realm_url: &str) -> Result<Self, EndpointError> {
        let realm_url = realm_url.trim();
        let parsed = Url::parse(realm_url)?;
        let https = match parsed.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };

        Ok(Self {
            realm_url: realm_url.trim_end_matches('/').to_string(),
            https,
        })
    }

    pub fn realm_url(&self) -> &str {
        &self.realm_url
    }

    pub fn is_https(&self) -> bool {
        self.https
    }

    /// `iss` value tokens minted by this realm carry.
    pub fn issuer(&self) -> &str {
        &self.realm_url
    }

    pub fn registration_url(&self) -> String {
        format!("{}/clients-registrations/openid-connect", self.realm_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url)
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.realm_url)
    }
}
