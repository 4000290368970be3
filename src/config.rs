/*
 * Responsibility
 * - load gateway settings from the environment (.env in development)
 * - validate them; any problem fails startup
 */
use std::fmt;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::auth::membership::{OboGrant, is_valid_group_id};
use crate::services::oauth::RealmEndpoints;

const MAX_TTL_SECONDS: u64 = 86_400;
const MAX_MARGIN_SECONDS: i64 = 3_600;
const MAX_TIMEOUT_SECONDS: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Deployment-supplied client credentials.
#[derive(Clone)]
pub struct GatewayCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub realm: RealmEndpoints,
    pub server_base_url: String,

    pub auth_issuer: String,
    pub auth_audience: String,
    pub auth_jwks_url: String,
    pub auth_required_scopes: Vec<String>,
    pub auth_principal_claim: String,
    pub access_token_leeway_seconds: u64,
    pub jwks_cache_ttl: Duration,

    pub admin_group_id: Option<String>,
    pub gateway_credentials: Option<GatewayCredentials>,
    pub dcr_register_on_startup: bool,
    pub dcr_client_name_prefix: String,
    pub dcr_credentials_file: Option<PathBuf>,
    pub token_refresh_margin_seconds: i64,

    pub obo_token_url: String,
    pub obo_grant: OboGrant,
    pub obo_scope: String,
    pub group_directory_url: String,
    pub membership_cache_ttl: Option<Duration>,
    pub valkey_url: Option<String>,

    pub http_client_timeout: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_env = AppEnv::parse(std::env::var("APP_ENV").ok().as_deref());
        if !app_env.is_production() {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` uses the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let app_env = AppEnv::parse(get("APP_ENV").as_deref());

        let port: u16 = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };
        let addr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let realm_url = get("IDP_REALM_URL").ok_or(ConfigError::Missing("IDP_REALM_URL"))?;
        let realm =
            RealmEndpoints::new(&realm_url).map_err(|_| ConfigError::Invalid("IDP_REALM_URL"))?;
        if app_env.is_production() && !realm.is_https() {
            return Err(ConfigError::Invalid("IDP_REALM_URL"));
        }

        let server_base_url = get("SERVER_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&server_base_url).map_err(|_| ConfigError::Invalid("SERVER_BASE_URL"))?;

        let auth_audience = get("AUTH_AUDIENCE").ok_or(ConfigError::Missing("AUTH_AUDIENCE"))?;
        let auth_issuer = get("AUTH_ISSUER").unwrap_or_else(|| realm.issuer().to_string());
        let auth_jwks_url = get("AUTH_JWKS_URL").unwrap_or_else(|| realm.jwks_url());

        let auth_required_scopes = get("AUTH_REQUIRED_SCOPES")
            .unwrap_or_default()
            .split([',', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        let auth_principal_claim = get("AUTH_PRINCIPAL_CLAIM").unwrap_or_else(|| "sub".to_string());

        let access_token_leeway_seconds =
            parse_in_range(&get, "ACCESS_TOKEN_LEEWAY_SECONDS", 60u64, 0..=MAX_TIMEOUT_SECONDS)?;
        let jwks_cache_ttl = Duration::from_secs(parse_in_range(
            &get,
            "JWKS_CACHE_TTL_SECONDS",
            300u64,
            1..=MAX_TTL_SECONDS,
        )?);

        let admin_group_id = get("ADMIN_GROUP_ID");
        if let Some(group) = &admin_group_id
            && !is_valid_group_id(group)
        {
            return Err(ConfigError::Invalid("ADMIN_GROUP_ID"));
        }

        let gateway_credentials = match (get("GATEWAY_CLIENT_ID"), get("GATEWAY_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GatewayCredentials {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("GATEWAY_CLIENT_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("GATEWAY_CLIENT_ID")),
        };

        let dcr_register_on_startup = parse_bool(&get, "DCR_REGISTER_ON_STARTUP", false)?;
        let dcr_client_name_prefix =
            get("DCR_CLIENT_NAME_PREFIX").unwrap_or_else(|| "mcp-gateway".to_string());
        let dcr_credentials_file = get("DCR_CREDENTIALS_FILE").map(PathBuf::from);

        // Every DCR call creates a new client, so the result must have somewhere to live.
        if dcr_register_on_startup
            && gateway_credentials.is_none()
            && dcr_credentials_file.is_none()
        {
            return Err(ConfigError::Missing("DCR_CREDENTIALS_FILE"));
        }

        // Without client credentials the on-behalf-of exchange is impossible.
        if admin_group_id.is_some() && gateway_credentials.is_none() && !dcr_register_on_startup {
            return Err(ConfigError::Missing("GATEWAY_CLIENT_ID"));
        }

        let token_refresh_margin_seconds = parse_in_range(
            &get,
            "TOKEN_REFRESH_MARGIN_SECONDS",
            60i64,
            0..=MAX_MARGIN_SECONDS,
        )?;

        let obo_token_url = get("OBO_TOKEN_URL").unwrap_or_else(|| realm.token_url());
        let obo_grant = match get("OBO_GRANT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("OBO_GRANT"))?,
            None => OboGrant::JwtBearer,
        };
        let obo_scope = get("OBO_SCOPE")
            .unwrap_or_else(|| "https://graph.microsoft.com/.default".to_string());
        let group_directory_url = get("GROUP_DIRECTORY_URL")
            .unwrap_or_else(|| "https://graph.microsoft.com/v1.0".to_string());

        let membership_cache_ttl =
            match parse_in_range(&get, "MEMBERSHIP_CACHE_TTL_SECONDS", 0u64, 0..=MAX_TTL_SECONDS)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        let valkey_url = get("VALKEY_URL");

        let http_client_timeout = Duration::from_secs(parse_in_range(
            &get,
            "HTTP_CLIENT_TIMEOUT_SECONDS",
            10u64,
            1..=MAX_TIMEOUT_SECONDS,
        )?);
        let request_timeout = Duration::from_secs(parse_in_range(
            &get,
            "REQUEST_TIMEOUT_SECONDS",
            30u64,
            1..=MAX_TIMEOUT_SECONDS,
        )?);

        Ok(Self {
            addr,
            app_env,
            realm,
            server_base_url,
            auth_issuer,
            auth_audience,
            auth_jwks_url,
            auth_required_scopes,
            auth_principal_claim,
            access_token_leeway_seconds,
            jwks_cache_ttl,
            admin_group_id,
            gateway_credentials,
            dcr_register_on_startup,
            dcr_client_name_prefix,
            dcr_credentials_file,
            token_refresh_margin_seconds,
            obo_token_url,
            obo_grant,
            obo_scope,
            group_directory_url,
            membership_cache_ttl,
            valkey_url,
            http_client_timeout,
            request_timeout,
        })
    }

    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.server_base_url)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_in_range<T, G>(
    get: &G,
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(key))
    }
}

fn parse_bool<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("IDP_REALM_URL", "http://localhost:8080/realms/mcp/"),
        ("AUTH_AUDIENCE", "mcp-server"),
    ];

    #[test]
    fn defaults_derive_from_the_realm() {
        let config = load(BASE).unwrap();

        assert_eq!(config.auth_issuer, "http://localhost:8080/realms/mcp");
        assert_eq!(
            config.auth_jwks_url,
            "http://localhost:8080/realms/mcp/protocol/openid-connect/certs"
        );
        assert_eq!(config.auth_principal_claim, "sub");
        assert_eq!(config.server_base_url, "http://localhost:3000");
        assert!(config.membership_cache_ttl.is_none());
        assert!(config.admin_group_id.is_none());
    }

    #[test]
    fn required_values_are_reported_by_name() {
        let err = load(&[("AUTH_AUDIENCE", "x")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("IDP_REALM_URL")));
    }

    #[test]
    fn production_requires_https_realm() {
        let mut pairs = BASE.to_vec();
        pairs.push(("APP_ENV", "production"));
        assert!(matches!(
            load(&pairs).unwrap_err(),
            ConfigError::Invalid("IDP_REALM_URL")
        ));
    }

    #[test]
    fn admin_group_without_credentials_is_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ADMIN_GROUP_ID", "6f1c2a7e-0000-4000-8000-000000000001"));
        assert!(load(&pairs).is_err());

        pairs.push(("GATEWAY_CLIENT_ID", "gw"));
        pairs.push(("GATEWAY_CLIENT_SECRET", "s3cret"));
        let config = load(&pairs).unwrap();
        assert!(config.gateway_credentials.is_some());
    }

    #[test]
    fn scopes_accept_commas_and_spaces() {
        let mut pairs = BASE.to_vec();
        pairs.push(("AUTH_REQUIRED_SCOPES", "mcp:access, openid profile"));
        let config = load(&pairs).unwrap();
        assert_eq!(config.auth_required_scopes, vec!["mcp:access", "openid", "profile"]);
    }

    #[test]
    fn startup_registration_needs_a_credentials_file() {
        let mut pairs = BASE.to_vec();
        pairs.push(("DCR_REGISTER_ON_STARTUP", "true"));
        assert!(matches!(
            load(&pairs).unwrap_err(),
            ConfigError::Missing("DCR_CREDENTIALS_FILE")
        ));

        pairs.push(("DCR_CREDENTIALS_FILE", "/var/lib/gateway/client.json"));
        let config = load(&pairs).unwrap();
        assert_eq!(
            config.dcr_credentials_file.as_deref(),
            Some(std::path::Path::new("/var/lib/gateway/client.json"))
        );
    }

    #[test]
    fn durations_outside_their_range_are_rejected() {
        for (key, value) in [
            ("MEMBERSHIP_CACHE_TTL_SECONDS", "18446744073709551615"),
            ("MEMBERSHIP_CACHE_TTL_SECONDS", "86401"),
            ("TOKEN_REFRESH_MARGIN_SECONDS", "9223372036854775807"),
            ("TOKEN_REFRESH_MARGIN_SECONDS", "-1"),
            ("JWKS_CACHE_TTL_SECONDS", "0"),
            ("REQUEST_TIMEOUT_SECONDS", "99999999999"),
        ] {
            let mut pairs = BASE.to_vec();
            pairs.push((key, value));
            match load(&pairs) {
                Err(ConfigError::Invalid(k)) => assert_eq!(k, key),
                other => panic!("{key}={value}: {other:?}"),
            }
        }
    }

    #[test]
    fn credentials_debug_hides_the_secret() {
        let creds = GatewayCredentials {
            client_id: "gw".into(),
            client_secret: "s3cret".into(),
        };
        assert!(!format!("{:?}", creds).contains("s3cret"));
    }
}
