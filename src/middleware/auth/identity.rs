//! Identity propagation for every capability invocation.
//!
//! Per request: `Unauthenticated -> TokenPresented -> Verified -> ContextPopulated ->
//! Dispatched`. A request without a token may only reach capabilities that do not need
//! identity. A presented token is always verified, and any verification failure ends the
//! request before the capability runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::{InvocationHook, Invocation, Next, RequestContext, USER_ID_KEY};
use crate::error::AppError;
use crate::services::auth::principal::Caller;
use crate::services::auth::verifier::TokenVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStage {
    Unauthenticated,
    TokenPresented,
    Verified,
    ContextPopulated,
    Dispatched,
}

impl IdentityStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStage::Unauthenticated => "unauthenticated",
            IdentityStage::TokenPresented => "token_presented",
            IdentityStage::Verified => "verified",
            IdentityStage::ContextPopulated => "context_populated",
            IdentityStage::Dispatched => "dispatched",
        }
    }

    fn record(self) {
        tracing::Span::current().record("identity.stage", self.as_str());
    }
}

pub struct IdentityHook {
    verifier: Arc<TokenVerifier>,
}

impl IdentityHook {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl InvocationHook for IdentityHook {
    async fn around(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> Result<Value, AppError> {
        let requires_identity = next.descriptor().requires_identity;
        IdentityStage::Unauthenticated.record();

        match ctx.presented_token() {
            None if requires_identity => {
                warn!(
                    target_name = %invocation.target,
                    "no bearer token for capability that requires identity"
                );
                return Err(AppError::AuthenticationRequired);
            }
            None => {
                debug!(target_name = %invocation.target, "anonymous invocation");
            }
            Some(token) => {
                IdentityStage::TokenPresented.record();

                let principal = match self.verifier.verify(token).await {
                    Ok(principal) => principal,
                    Err(err) => {
                        warn!(
                            reason = err.reason_code(),
                            token = %token.fingerprint(),
                            error = %err,
                            "access token verification failed"
                        );
                        return Err(err.into());
                    }
                };
                IdentityStage::Verified.record();

                let principal_id = principal.principal_id.clone();
                ctx.bind_caller(Caller {
                    principal,
                    token: token.clone(),
                })?;
                ctx.set_state(USER_ID_KEY, Value::String(principal_id.clone()))?;
                IdentityStage::ContextPopulated.record();

                debug!(user_id = %principal_id, "request context populated");
            }
        }

        IdentityStage::Dispatched.record();
        next.run(invocation, ctx).await
    }
}
