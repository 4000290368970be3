use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::Value;
use thiserror::Error;

use crate::error::AppError;
use crate::services::auth::principal::{BearerToken, Caller};

/// Key under which the verified principal id is stored.
pub const USER_ID_KEY: &str = "user_id";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("request context key already set: {0}")]
    KeyExists(String),
    #[error("caller already bound to this request")]
    CallerAlreadyBound,
    #[error("request context lock poisoned")]
    Poisoned,
}

/// Per-request state shared by the hooks and the capability of one invocation.
///
/// Cloning is cheap and clones share state. A new context is built for every inbound
/// request and dropped with it, so nothing here is visible to another request.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

struct Inner {
    request_id: String,
    presented: Option<BearerToken>,
    caller: OnceLock<Caller>,
    state: Mutex<HashMap<String, Value>>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.inner.request_id)
            .field("token_presented", &self.inner.presented.is_some())
            .field("user_id", &self.user_id())
            .finish()
    }
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, presented: Option<BearerToken>) -> Self {
        Self {
            inner: Arc::new(Inner {
                request_id: request_id.into(),
                presented,
                caller: OnceLock::new(),
                state: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Raw token from the `Authorization` header, not yet verified.
    pub fn presented_token(&self) -> Option<&BearerToken> {
        self.inner.presented.as_ref()
    }

    /// Insert a value. Keys are write-once for the lifetime of the request.
    pub fn set_state(&self, key: &str, value: Value) -> Result<(), ContextError> {
        let mut state = self.inner.state.lock().map_err(|_| ContextError::Poisoned)?;
        if state.contains_key(key) {
            return Err(ContextError::KeyExists(key.to_string()));
        }
        state.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .ok()
            .and_then(|state| state.get(key).cloned())
    }

    pub fn bind_caller(&self, caller: Caller) -> Result<(), ContextError> {
        self.inner
            .caller
            .set(caller)
            .map_err(|_| ContextError::CallerAlreadyBound)
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.inner.caller.get()
    }

    pub fn user_id(&self) -> Option<String> {
        match self.get_state(USER_ID_KEY) {
            Some(Value::String(id)) => Some(id),
            _ => None,
        }
    }

    /// For capabilities that act on behalf of a principal. Some entry points skip the
    /// identity hook, so handlers check again here.
    pub fn require_user_id(&self) -> Result<String, AppError> {
        self.user_id().ok_or(AppError::AuthenticationRequired)
    }

    pub fn require_caller(&self) -> Result<&Caller, AppError> {
        self.caller().ok_or(AppError::AuthenticationRequired)
    }
}
