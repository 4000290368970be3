//! Opt-in short-lived cache of definite membership decisions.
//!
//! Disabled unless a TTL is configured. Only `member` / `not member` answers are stored;
//! an unverifiable check is never cached. Cache backend errors count as a miss.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::services::cache::CacheClient;

pub struct MembershipCache {
    client: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl MembershipCache {
    pub fn new(client: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    fn key(principal_id: &str, group_id: &str) -> String {
        format!("membership:{}:{}", principal_id, group_id)
    }

    pub async fn get(&self, principal_id: &str, group_id: &str) -> Option<bool> {
        match self.client.get_string(&Self::key(principal_id, group_id)).await {
            Ok(Some(v)) if v == "1" => Some(true),
            Ok(Some(v)) if v == "0" => Some(false),
            Ok(_) => None,
            Err(err) => {
                warn!(
                    backend = self.client.backend_name(),
                    error = %err,
                    "membership cache read failed"
                );
                None
            }
        }
    }

    pub async fn put(&self, principal_id: &str, group_id: &str, is_member: bool) {
        let value = if is_member { "1" } else { "0" };
        if let Err(err) = self
            .client
            .set_with_ttl(&Self::key(principal_id, group_id), value, self.ttl)
            .await
        {
            warn!(
                backend = self.client.backend_name(),
                error = %err,
                "membership cache write failed"
            );
        }
    }
}
