//! Published signing keys of the identity provider.
//!
//! `RemoteJwks` fetches the realm's JWK Set and caches it. A token naming a `kid` that is
//! not in the cached set triggers one refetch (key rotation), rate limited so a flood of
//! garbage `kid`s cannot turn into a flood of provider calls. Callers that queued behind
//! an in-flight fetch share its result, failures included. Fetch failures surface as
//! `KeySetError::Unavailable`; callers must fail closed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum KeySetError {
    #[error("key set unavailable: {0}")]
    Unavailable(String),
    #[error("no key matches kid {0:?}")]
    UnknownKey(Option<String>),
}

#[async_trait]
pub trait KeySource: Send + Sync {
    /// Key for `kid`. Without a `kid`, a set holding exactly one key yields that key.
    async fn key_for(&self, kid: Option<&str>) -> Result<Jwk, KeySetError>;
}

fn select(set: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => set.find(kid).cloned(),
        None if set.keys.len() == 1 => set.keys.first().cloned(),
        None => None,
    }
}

/// Fixed key set (pinned deployments, tests).
#[derive(Debug, Clone)]
pub struct StaticJwks {
    set: JwkSet,
}

impl StaticJwks {
    pub fn new(set: JwkSet) -> Self {
        Self { set }
    }
}

#[async_trait]
impl KeySource for StaticJwks {
    async fn key_for(&self, kid: Option<&str>) -> Result<Jwk, KeySetError> {
        select(&self.set, kid).ok_or_else(|| unknown(kid))
    }
}

struct CachedSet {
    set: JwkSet,
    fetched_at: Instant,
}

/// Cached set plus the outcome of the latest fetch, shared with callers that waited on it.
#[derive(Default)]
struct KeyState {
    set: Option<CachedSet>,
    generation: u64,
    last_error: Option<KeySetError>,
    last_attempt: Option<Instant>,
}

pub struct RemoteJwks {
    http: reqwest::Client,
    url: String,
    ttl: Duration,
    min_refetch_interval: Duration,
    state: RwLock<KeyState>,
    refresh: Mutex<()>,
}

impl std::fmt::Debug for RemoteJwks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteJwks")
            .field("url", &self.url)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RemoteJwks {
    pub fn new(http: reqwest::Client, url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            ttl,
            min_refetch_interval: Duration::from_secs(10),
            state: RwLock::new(KeyState::default()),
            refresh: Mutex::new(()),
        }
    }

    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KeySetError::Unavailable(format!("GET {}: {}", self.url, e)))?;

        if !resp.status().is_success() {
            return Err(KeySetError::Unavailable(format!(
                "GET {} returned {}",
                self.url,
                resp.status()
            )));
        }

        let set: JwkSet = resp
            .json()
            .await
            .map_err(|e| KeySetError::Unavailable(format!("invalid JWK set: {}", e)))?;

        debug!(url = %self.url, keys = set.keys.len(), "fetched JWK set");
        Ok(set)
    }

    fn is_live(&self, entry: &CachedSet) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }
}

fn unknown(kid: Option<&str>) -> KeySetError {
    KeySetError::UnknownKey(kid.map(str::to_string))
}

#[async_trait]
impl KeySource for RemoteJwks {
    async fn key_for(&self, kid: Option<&str>) -> Result<Jwk, KeySetError> {
        let seen = {
            let state = self.state.read().await;
            if let Some(entry) = state.set.as_ref().filter(|e| self.is_live(e))
                && let Some(jwk) = select(&entry.set, kid)
            {
                return Ok(jwk);
            }
            state.generation
        };

        let _guard = self.refresh.lock().await;

        {
            let state = self.state.read().await;

            // A fetch finished while we waited: take its outcome, whatever it was.
            if state.generation != seen {
                if let Some(err) = &state.last_error {
                    return Err(err.clone());
                }
                return state
                    .set
                    .as_ref()
                    .and_then(|entry| select(&entry.set, kid))
                    .ok_or_else(|| unknown(kid));
            }

            let expired = !state.set.as_ref().is_some_and(|e| self.is_live(e));
            let recent = state
                .last_attempt
                .is_some_and(|at| at.elapsed() < self.min_refetch_interval);
            if recent {
                if let Some(err) = &state.last_error {
                    return Err(err.clone());
                }
                if !expired {
                    return Err(unknown(kid));
                }
            }
        }

        let outcome = self.fetch().await;

        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        state.last_attempt = Some(Instant::now());
        match outcome {
            Ok(set) => {
                let found = select(&set, kid);
                state.set = Some(CachedSet {
                    set,
                    fetched_at: Instant::now(),
                });
                state.last_error = None;
                found.ok_or_else(|| unknown(kid))
            }
            Err(err) => {
                warn!(error = %err, "JWK set fetch failed");
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}
