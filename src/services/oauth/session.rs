//! Process-wide client state: the registration and a single-flight token cache.
//!
//! `ClientSession` is owned by whoever builds the application state and injected where
//! needed; there is no global. Concurrent callers that find the cached token stale
//! serialize on `refresh`. Each completed refresh bumps a generation counter, and a
//! caller that sees the counter moved while it waited takes that outcome, success or
//! failure, instead of issuing its own request.

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::services::oauth::credential_store::CredentialStore;
use crate::services::oauth::registrar::{ClientRegistration, CredentialRegistrar, RegistrationError};
use crate::services::oauth::token::{AccessToken, TokenAcquirer, TokenAcquisitionError};

/// How the process obtains its client registration at startup.
#[derive(Debug, Clone)]
pub enum RegistrationSource {
    /// Credentials supplied by the deployment.
    Configured(ClientRegistration),
    /// Reuse the registration in `store`, registering via DCR only when it is empty.
    Register {
        client_name_prefix: String,
        store: CredentialStore,
    },
    /// No client credentials; flows that need them are unavailable.
    Disabled,
}

#[derive(Default)]
struct TokenState {
    generation: u64,
    last: Option<Result<AccessToken, TokenAcquisitionError>>,
}

pub struct ClientSession {
    registration: ClientRegistration,
    acquirer: TokenAcquirer,
    refresh_margin: Duration,
    state: RwLock<TokenState>,
    refresh: Mutex<()>,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("client_id", &self.registration.client_id)
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}

impl ClientSession {
    pub fn new(
        registration: ClientRegistration,
        acquirer: TokenAcquirer,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            registration,
            acquirer,
            refresh_margin,
            state: RwLock::new(TokenState::default()),
            refresh: Mutex::new(()),
        }
    }

    /// Resolve the registration for this process.
    ///
    /// A DCR or storage failure is returned as-is; callers treat it as fatal to startup.
    pub async fn bootstrap(
        source: RegistrationSource,
        registrar: &CredentialRegistrar,
        acquirer: TokenAcquirer,
        refresh_margin: Duration,
    ) -> Result<Option<Self>, RegistrationError> {
        let registration = match source {
            RegistrationSource::Configured(registration) => {
                info!(client_id = %registration.client_id, "using configured client registration");
                registration
            }
            RegistrationSource::Register {
                client_name_prefix,
                store,
            } => match store.load().await? {
                Some(registration) => {
                    info!(
                        client_id = %registration.client_id,
                        path = %store.path().display(),
                        "reusing persisted client registration"
                    );
                    registration
                }
                None => {
                    let registration = registrar.register(&client_name_prefix).await?;
                    store.save(&registration).await?;
                    info!(
                        client_id = %registration.client_id,
                        path = %store.path().display(),
                        "registered client at startup and persisted it"
                    );
                    registration
                }
            },
            RegistrationSource::Disabled => return Ok(None),
        };

        Ok(Some(Self::new(registration, acquirer, refresh_margin)))
    }

    pub fn registration(&self) -> &ClientRegistration {
        &self.registration
    }

    /// Cached access token, refreshed when inside the safety margin.
    pub async fn access_token(&self) -> Result<AccessToken, TokenAcquisitionError> {
        let seen = {
            let state = self.state.read().await;
            if let Some(Ok(token)) = &state.last
                && !token.needs_refresh(self.refresh_margin)
            {
                return Ok(token.clone());
            }
            state.generation
        };

        let _guard = self.refresh.lock().await;

        {
            let state = self.state.read().await;
            if state.generation != seen
                && let Some(outcome) = &state.last
            {
                debug!("reusing refresh outcome of a concurrent caller");
                return outcome.clone();
            }
        }

        let outcome = self.acquirer.request_token(&self.registration).await;

        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        // A failed refresh replaces the stale token, so nothing expired stays usable.
        state.last = Some(outcome.clone());
        outcome
    }
}
