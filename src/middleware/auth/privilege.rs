//! Admin-group gate for capabilities marked privileged.
//!
//! Runs after the identity hook, so a bound caller is expected. Membership is checked
//! fresh (or from the opt-in cache) on every privileged call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use crate::dispatch::{InvocationHook, Invocation, Next, RequestContext};
use crate::error::AppError;
use crate::services::auth::membership::MembershipService;

pub struct PrivilegeHook {
    membership: Option<Arc<MembershipService>>,
    admin_group_id: Option<String>,
}

impl PrivilegeHook {
    pub fn new(membership: Option<Arc<MembershipService>>, admin_group_id: Option<String>) -> Self {
        Self {
            membership,
            admin_group_id,
        }
    }
}

#[async_trait]
impl InvocationHook for PrivilegeHook {
    async fn around(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> Result<Value, AppError> {
        if !next.descriptor().privileged {
            return next.run(invocation, ctx).await;
        }

        let caller = ctx.require_caller()?;

        let (Some(membership), Some(group_id)) = (&self.membership, &self.admin_group_id) else {
            error!(
                target_name = %invocation.target,
                "privileged capability invoked but no admin group is configured"
            );
            return Err(AppError::Internal);
        };

        let decision = membership.authorize(caller, group_id).await?;
        info!(
            user_id = %decision.principal_id,
            group_id = %decision.group_id,
            target_name = %invocation.target,
            "privileged invocation authorized"
        );

        next.run(invocation, ctx).await
    }
}
