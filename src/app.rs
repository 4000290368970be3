use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::middleware::auth::{IdentityHook, PrivilegeHook};
use crate::middleware::http::{self, HttpLimits};
use crate::middleware::telemetry::TelemetryHook;
use crate::repos::{ExpenseRepo, InMemoryExpenseRepo};
use crate::services::auth::membership::MembershipService;
use crate::services::auth::{TokenVerifier, build_membership_service, build_token_verifier};
use crate::services::oauth::{
    ClientRegistration, ClientSession, CredentialRegistrar, CredentialStore, RegistrationSource,
    TokenAcquirer,
};
use crate::state::{AppState, ProtectedResource};
use crate::tools;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,mcp_auth_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development fails fast; production keeps serving other requests.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("failed to load configuration")?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting gateway in {:?} mode on {} (realm {})",
        config.app_env,
        config.addr,
        config.realm.realm_url()
    );

    let state = build_state(&config).await?;
    let app = build_router(
        state,
        HttpLimits {
            request_timeout: config.request_timeout,
            ..HttpLimits::default()
        },
    );

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn registration_source(config: &Config) -> RegistrationSource {
    if let Some(creds) = &config.gateway_credentials {
        RegistrationSource::Configured(ClientRegistration::from_parts(
            creds.client_id.clone(),
            creds.client_secret.clone(),
        ))
    } else if config.dcr_register_on_startup
        && let Some(path) = &config.dcr_credentials_file
    {
        RegistrationSource::Register {
            client_name_prefix: config.dcr_client_name_prefix.clone(),
            store: CredentialStore::new(path),
        }
    } else {
        RegistrationSource::Disabled
    }
}

/// Build process-level services and inject them into the shared application state.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let http = reqwest::Client::builder()
        .timeout(config.http_client_timeout)
        .build()
        .context("failed to build http client")?;

    let verifier = build_token_verifier(config, http.clone());

    let registrar = CredentialRegistrar::new(http.clone(), config.realm.clone());
    let acquirer = TokenAcquirer::new(http.clone(), config.realm.clone());
    let session = ClientSession::bootstrap(
        registration_source(config),
        &registrar,
        acquirer,
        chrono::Duration::seconds(config.token_refresh_margin_seconds),
    )
    .await
    .context("client registration failed")?
    .map(Arc::new);

    // Privileged calls depend on these credentials; prove them before serving.
    if let (Some(session), Some(_)) = (&session, &config.admin_group_id) {
        session
            .access_token()
            .await
            .context("gateway client credentials were rejected")?;
    }

    let membership = build_membership_service(config, http, session)
        .await
        .context("failed to initialize membership cache")?;

    let repo: Arc<dyn ExpenseRepo> = Arc::new(InMemoryExpenseRepo::new());
    let dispatcher = build_dispatcher(verifier, membership, config.admin_group_id.clone(), repo);

    Ok(AppState::new(
        Arc::new(dispatcher),
        ProtectedResource::from_config(config),
    ))
}

/// Hook order: telemetry (outermost), identity, privilege.
pub fn build_dispatcher(
    verifier: Arc<TokenVerifier>,
    membership: Option<Arc<MembershipService>>,
    admin_group_id: Option<String>,
    repo: Arc<dyn ExpenseRepo>,
) -> Dispatcher {
    let mut builder = Dispatcher::builder()
        .hook(Arc::new(TelemetryHook::new()))
        .hook(Arc::new(IdentityHook::new(verifier)))
        .hook(Arc::new(PrivilegeHook::new(membership, admin_group_id)));

    for capability in tools::expenses::capabilities(repo) {
        builder = builder.capability(capability);
    }
    builder.build()
}

pub fn build_router(state: AppState, limits: HttpLimits) -> Router {
    let router = api::routes().with_state(state);
    http::apply(router, limits)
}
