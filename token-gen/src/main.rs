use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mcp_auth_gateway::services::oauth::{
    ClientRegistration, CredentialRegistrar, RealmEndpoints, TokenAcquirer,
};

/// Obtain an access token for calling the gateway.
///
/// Registers a client via Dynamic Client Registration (unless credentials are given),
/// runs the client-credentials grant and prints the resulting Authorization header.
/// Registration is not idempotent: every run without credentials creates a new client.
#[derive(Parser, Debug)]
#[command(name = "token-gen", version, about)]
struct Args {
    /// Realm URL of the identity provider (e.g. http://localhost:8080/realms/mcp)
    #[arg(long, env = "IDP_REALM_URL")]
    realm_url: String,

    /// Prefix of the registered client name
    #[arg(long, default_value = "mcp-agent")]
    client_name_prefix: String,

    /// Use an existing client instead of registering one
    #[arg(long, env = "TOKEN_GEN_CLIENT_ID", requires = "client_secret")]
    client_id: Option<String>,

    #[arg(long, env = "TOKEN_GEN_CLIENT_SECRET", requires = "client_id", hide_env_values = true)]
    client_secret: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Print only the Authorization header
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if !args.quiet {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let endpoints = RealmEndpoints::new(&args.realm_url).context("invalid --realm-url")?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()
        .context("failed to build http client")?;

    let registration = match (args.client_id, args.client_secret) {
        (Some(id), Some(secret)) => ClientRegistration::from_parts(id, secret),
        _ => CredentialRegistrar::new(http.clone(), endpoints.clone())
            .register(&args.client_name_prefix)
            .await
            .context("client registration failed")?,
    };

    let token = TokenAcquirer::new(http, endpoints)
        .request_token(&registration)
        .await
        .context("token request failed")?;

    if args.quiet {
        println!("Authorization: {}", token.token.header_value());
        return Ok(());
    }

    println!("client_id: {}", registration.client_id);
    println!(
        "expires_at: {}",
        token.expires_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    );
    if !token.scopes.is_empty() {
        let scopes: Vec<&str> = token.scopes.iter().map(String::as_str).collect();
        println!("scope: {}", scopes.join(" "));
    }
    println!("Authorization: {}", token.token.header_value());

    Ok(())
}
