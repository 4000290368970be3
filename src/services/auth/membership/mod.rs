//! Authorization decisions for privileged operations.
//!
//! A privileged call is allowed only when the caller's token can be exchanged on their
//! behalf for a directory token AND the directory reports at least one matching
//! membership. Anything else fails closed, and "could not check" is reported apart from
//! "checked, not a member".

mod cache;
mod directory;
mod obo;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::AppError;
use crate::services::auth::principal::Caller;

pub use cache::MembershipCache;
pub use directory::{DirectoryError, GraphGroupDirectory, GroupDirectory, is_valid_group_id};
pub use obo::{HttpOboExchanger, OboError, OboExchange, OboGrant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembershipDecision {
    pub principal_id: String,
    pub group_id: String,
    pub is_member: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("cannot verify group membership: {0}")]
    CannotVerify(String),
}

impl From<OboError> for MembershipError {
    fn from(e: OboError) -> Self {
        Self::CannotVerify(e.to_string())
    }
}

impl From<DirectoryError> for MembershipError {
    fn from(e: DirectoryError) -> Self {
        Self::CannotVerify(e.to_string())
    }
}

pub struct MembershipService {
    obo: Arc<dyn OboExchange>,
    directory: Arc<dyn GroupDirectory>,
    cache: Option<MembershipCache>,
}

impl MembershipService {
    pub fn new(obo: Arc<dyn OboExchange>, directory: Arc<dyn GroupDirectory>) -> Self {
        Self {
            obo,
            directory,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: MembershipCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Check whether the caller belongs (transitively) to `group_id`.
    pub async fn is_member(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> Result<GroupMembershipDecision, MembershipError> {
        let principal_id = caller.principal_id();

        if let Some(cache) = &self.cache
            && let Some(is_member) = cache.get(principal_id, group_id).await
        {
            info!(principal_id, group_id, is_member, "membership decision from cache");
            return Ok(GroupMembershipDecision {
                principal_id: principal_id.to_string(),
                group_id: group_id.to_string(),
                is_member,
                checked_at: Utc::now(),
            });
        }

        let directory_token = self.obo.exchange(&caller.token).await.inspect_err(|err| {
            warn!(principal_id, error = %err, "on-behalf-of exchange failed");
        })?;

        let count = self
            .directory
            .transitive_membership_count(&directory_token, group_id)
            .await
            .inspect_err(|err| {
                warn!(principal_id, group_id, error = %err, "group membership query failed");
            })?;

        let is_member = count > 0;
        info!(principal_id, group_id, count, is_member, "checked group membership");

        if let Some(cache) = &self.cache {
            cache.put(principal_id, group_id, is_member).await;
        }

        Ok(GroupMembershipDecision {
            principal_id: principal_id.to_string(),
            group_id: group_id.to_string(),
            is_member,
            checked_at: Utc::now(),
        })
    }

    /// Gate for privileged operations: not a member is 403, unverifiable is 503.
    pub async fn authorize(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> Result<GroupMembershipDecision, AppError> {
        match self.is_member(caller, group_id).await {
            Ok(decision) if decision.is_member => Ok(decision),
            Ok(_) => Err(AppError::AuthorizationDenied {
                message: "caller is not a member of the required group".to_string(),
            }),
            Err(MembershipError::CannotVerify(_)) => Err(AppError::CannotVerifyMembership),
        }
    }
}
