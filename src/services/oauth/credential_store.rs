//! On-disk copy of a DCR-issued registration.
//!
//! DCR creates a new client on every call, so the first registration is written here
//! and every later start reads it back instead of registering again.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::services::oauth::registrar::{ClientRegistration, ClientSecret, RegistrationError};

#[derive(Serialize, Deserialize)]
struct StoredRegistration {
    client_id: String,
    client_secret: String,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously persisted registration, or `None` if nothing was stored yet.
    pub async fn load(&self) -> Result<Option<ClientRegistration>, RegistrationError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.storage_error(e)),
        };

        let stored: StoredRegistration =
            serde_json::from_slice(&bytes).map_err(|e| self.storage_error(e))?;
        if stored.client_id.trim().is_empty() || stored.client_secret.is_empty() {
            return Err(self.storage_error("stored registration is incomplete"));
        }

        Ok(Some(ClientRegistration {
            client_id: stored.client_id,
            client_secret: ClientSecret::new(stored.client_secret),
            registered_at: stored.registered_at,
        }))
    }

    /// Write a fresh registration. Refuses to overwrite an existing file.
    pub async fn save(&self, registration: &ClientRegistration) -> Result<(), RegistrationError> {
        let stored = StoredRegistration {
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.expose().to_string(),
            registered_at: registration.registered_at,
        };
        let bytes = serde_json::to_vec_pretty(&stored).map_err(|e| self.storage_error(e))?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&self.path)
            .await
            .map_err(|e| self.storage_error(e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| self.storage_error(e))?;
        file.sync_all().await.map_err(|e| self.storage_error(e))
    }

    fn storage_error(&self, err: impl std::fmt::Display) -> RegistrationError {
        RegistrationError::Storage {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}
